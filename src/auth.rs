//! Login credential obfuscation used by the controller's `/menu.html` form.
//!
//! Every character code is XORed with `day_of_month << 2` and written as
//! uppercase hex, at least two digits per character. The key changes daily,
//! so the day is passed in rather than read from the clock here.

use std::fmt::Write;

/// Marker the controller embeds in the login page when credentials are rejected.
pub const LOGIN_ERROR_MARKER: &str = "res_error_title";

pub fn login_hash(value: &str, day_of_month: u32) -> String {
    let key = day_of_month << 2;
    value.chars().fold(String::with_capacity(value.len() * 2), |mut out, c| {
        // Writing to a String cannot fail.
        let _ = write!(out, "{:02X}", u32::from(c) ^ key);
        out
    })
}
