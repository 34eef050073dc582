//! Client for the HTTP interface of BMR HC64 heating controllers.
//!
//! ```no_run
//! use std::time::Duration;
//! use bmr_client::BmrClient;
//!
//! let client = BmrClient::new("192.168.1.10", "admin", "secret", Duration::from_secs(10));
//! for id in 0..client.get_num_circuits()? {
//!     let circuit = client.load_circuit(id)?;
//!     println!("{}: {:?} °C", circuit.name, circuit.temperature);
//! }
//! # Ok::<(), bmr_client::BmrClientError>(())
//! ```

pub mod models {
    pub mod bmr;
}

pub mod auth;
pub mod client;
pub mod config;
pub mod protocol;

pub use client::{BmrClient, BmrClientError, Reply, Transport, UreqTransport};
pub use models::bmr::{Assignments, CircuitId, CircuitStatus, LowMode};
