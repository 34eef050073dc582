use bmr_client::config::{load_env_file, Config};
use bmr_client::{Assignments, BmrClient, CircuitId};
use log::{debug, error, info};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;

const USAGE: &str = "usage: bmr [--env-file PATH] <command>

commands:
  circuits                        status of every circuit
  circuit <id>                    status of one circuit
  summer [on|off]                 show or switch summer mode
  summer-rooms                    circuits assigned to summer mode
  summer-assign <on|off> <id>...  add/remove circuits to/from summer mode
  low                             show LOW mode
  low off | low on [temp]         switch LOW mode
  low-rooms                       circuits assigned to LOW mode
  low-assign <on|off> <id>...     add/remove circuits to/from LOW mode
  mode <circuit> [mode_id]        show or set the mode of a circuit
  target <order> <name> <temp>    set the temperature of a mode
  hdo                             low-tariff signal state";

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let line = serde_json::to_string(value).map_err(|e| format!("serializing output failed: {}", e))?;
    println!("{}", line);
    Ok(())
}

/// Raw vector plus the ids it selects, e.g. `{"circuits":[false,true],"assigned":[1]}`.
fn print_assignments(assignments: &Assignments) -> Result<(), String> {
    let assigned: Vec<CircuitId> = assignments.assigned().collect();
    print_json(&json!({ "circuits": assignments, "assigned": assigned }))
}

fn parse_switch(arg: Option<&String>) -> Result<bool, String> {
    match arg.map(String::as_str) {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        Some(other) => Err(format!("expected on/off, got {}", other)),
        None => Err("expected on/off".to_string()),
    }
}

fn parse_arg<T: std::str::FromStr>(arg: Option<&String>, what: &str) -> Result<T, String> {
    let raw = arg.ok_or_else(|| format!("missing {}", what))?;
    raw.parse::<T>().map_err(|_| format!("invalid {}: {}", what, raw))
}

fn parse_circuits(args: &[String]) -> Result<Vec<CircuitId>, String> {
    if args.is_empty() {
        return Err("at least one circuit id is required".to_string());
    }
    args.iter().map(|a| parse_arg(Some(a), "circuit id")).collect()
}

fn run(args: &[String]) -> Result<(), String> {
    let Some(command) = args.first() else {
        return Err(USAGE.to_string());
    };
    let rest = &args[1..];

    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (host={}, user={}, timeout={}s)",
        cfg.host,
        cfg.username,
        cfg.request_timeout.as_secs()
    );

    // 2) Init client
    let client = BmrClient::new(&cfg.host, &cfg.username, &cfg.password, cfg.request_timeout);
    debug!("Running command {} {:?}", command, rest);

    // 3) Dispatch
    match command.as_str() {
        "circuits" => {
            let count = client
                .get_num_circuits()
                .map_err(|e| format!("get_num_circuits failed: {}", e))?;
            info!("Controller reports {} circuit(s)", count);
            for id in 0..count {
                let circuit = client
                    .load_circuit(id)
                    .map_err(|e| format!("load_circuit({id}) failed: {}", e))?;
                print_json(&circuit)?;
            }
        }
        "circuit" => {
            let id: CircuitId = parse_arg(rest.first(), "circuit id")?;
            let circuit = client
                .load_circuit(id)
                .map_err(|e| format!("load_circuit({id}) failed: {}", e))?;
            print_json(&circuit)?;
        }
        "summer" => match rest.first() {
            None => {
                let on = client
                    .get_summer_mode()
                    .map_err(|e| format!("get_summer_mode failed: {}", e))?;
                print_json(&json!({ "summer_mode": on }))?;
            }
            switch => {
                let value = parse_switch(switch)?;
                let ok = client
                    .set_summer_mode(value)
                    .map_err(|e| format!("set_summer_mode failed: {}", e))?;
                print_json(&json!({ "accepted": ok }))?;
            }
        },
        "summer-rooms" => {
            let assignments = client
                .load_summer_mode_assignments()
                .map_err(|e| format!("load_summer_mode_assignments failed: {}", e))?;
            print_assignments(&assignments)?;
        }
        "summer-assign" => {
            let value = parse_switch(rest.first())?;
            let circuits = parse_circuits(rest.get(1..).unwrap_or_default())?;
            let ok = client
                .save_summer_mode_assignments(&circuits, value)
                .map_err(|e| format!("save_summer_mode_assignments failed: {}", e))?;
            print_json(&json!({ "accepted": ok }))?;
        }
        "low" => match rest.first().map(String::as_str) {
            None => {
                let low = client
                    .get_low_mode()
                    .map_err(|e| format!("get_low_mode failed: {}", e))?;
                print_json(&low)?;
            }
            Some(_) => {
                let enabled = parse_switch(rest.first())?;
                let temperature = match rest.get(1) {
                    Some(t) => Some(parse_arg::<u16>(Some(t), "temperature")?),
                    None => None,
                };
                let ok = client
                    .set_low_mode(enabled, temperature, None, None)
                    .map_err(|e| format!("set_low_mode failed: {}", e))?;
                print_json(&json!({ "accepted": ok }))?;
            }
        },
        "low-rooms" => {
            let assignments = client
                .load_low_mode_assignments()
                .map_err(|e| format!("load_low_mode_assignments failed: {}", e))?;
            print_assignments(&assignments)?;
        }
        "low-assign" => {
            let value = parse_switch(rest.first())?;
            let circuits = parse_circuits(rest.get(1..).unwrap_or_default())?;
            let ok = client
                .save_low_mode_assignments(&circuits, value)
                .map_err(|e| format!("save_low_mode_assignments failed: {}", e))?;
            print_json(&json!({ "accepted": ok }))?;
        }
        "mode" => {
            let circuit: CircuitId = parse_arg(rest.first(), "circuit id")?;
            match rest.get(1) {
                None => {
                    let mode_id = client
                        .get_mode_id(Some(circuit))
                        .map_err(|e| format!("get_mode_id({circuit}) failed: {}", e))?;
                    print_json(&json!({ "circuit": circuit, "mode_id": mode_id }))?;
                }
                Some(m) => {
                    let mode_id: u8 = parse_arg(Some(m), "mode id")?;
                    let ok = client
                        .set_mode_id(circuit, mode_id)
                        .map_err(|e| format!("set_mode_id({circuit}) failed: {}", e))?;
                    print_json(&json!({ "accepted": ok }))?;
                }
            }
        }
        "target" => {
            let order: u8 = parse_arg(rest.first(), "mode order number")?;
            let name = rest.get(1).ok_or_else(|| "missing mode name".to_string())?;
            let temperature: f64 = parse_arg(rest.get(2), "temperature")?;
            let ok = client
                .set_target_temperature(temperature, order, name)
                .map_err(|e| format!("set_target_temperature failed: {}", e))?;
            print_json(&json!({ "accepted": ok }))?;
        }
        "hdo" => {
            let hdo = client.load_hdo().map_err(|e| format!("load_hdo failed: {}", e))?;
            print_json(&json!({ "hdo": hdo }))?;
        }
        other => return Err(format!("unknown command: {}\n\n{}", other, USAGE)),
    }

    Ok(())
}

/// Split `--env-file` off the command line, load the env file and return the
/// remaining arguments.
fn configure_env_from_cli() -> Result<(Option<LoadedEnvFile>, Vec<String>), String> {
    let mut args = std::env::args_os();
    args.next(); // skip program name

    let mut env_file: Option<PathBuf> = None;
    let mut rest = Vec::new();

    while let Some(arg) = args.next() {
        let arg = arg
            .into_string()
            .map_err(|_| "argument contains invalid UTF-8".to_string())?;
        let value = if arg == "--env-file" {
            Some(
                args.next()
                    .ok_or_else(|| "`--env-file` requires a path argument".to_string())?
                    .into(),
            )
        } else {
            arg.strip_prefix("--env-file=").map(PathBuf::from)
        };

        match value {
            Some(_) if env_file.is_some() => return Err("`--env-file` provided more than once".to_string()),
            Some(path) if path.as_os_str().is_empty() => {
                return Err("`--env-file` requires a path argument".to_string());
            }
            Some(path) => env_file = Some(path),
            None => rest.push(arg),
        }
    }

    let loaded = match env_file {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            load_env_file(&path)?;
            Some(LoadedEnvFile { path, explicit: true })
        }
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
            let default_path = cwd.join(".env");
            if default_path.is_file() {
                load_env_file(&default_path)?;
                Some(LoadedEnvFile {
                    path: default_path,
                    explicit: false,
                })
            } else {
                None
            }
        }
    };

    Ok((loaded, rest))
}

fn main() {
    let (loaded_env, args) = match configure_env_from_cli() {
        Ok(v) => v,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "bmr {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(&args) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
