use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Secrets are left off this list on purpose
    const DISPLAY_ENVS: [&str; 29] = [
        "RUST_LOG",
        "LPG_HOST",
        "LPG_PORT",
        "LPG_DATABASE_URL",
        "LPG_MERCHANT_ID",
        "LPG_PAYMENT_TYPES",
        "LPG_BUSINESS_QR_MODE",
        "LPG_AMOUNT_OFFSET",
        "LPG_MATCH_TOLERANCE",
        "LPG_ORDER_TIMEOUT",
        "LPG_MONITOR_ENABLED",
        "LPG_MONITOR_INTERVAL",
        "LPG_LOCK_TIMEOUT",
        "LPG_LOCK_PATH",
        "LPG_AUTO_CLEANUP",
        "LPG_WORKER_COUNT",
        "LPG_QUEUE_SIZE",
        "LPG_FAILURE_THRESHOLD",
        "LPG_MONITORING_WINDOW",
        "LPG_LEDGER_LOOKBACK_HOURS",
        "LPG_LEDGER_URL",
        "LPG_LEDGER_APP_ID",
        "LPG_LEDGER_UTC_OFFSET",
        "LPG_LEDGER_TIMEOUT",
        "LPG_NOTIFY_TIMEOUT",
        "LPG_NOTIFY_ATTEMPTS",
        "LPG_NOTIFY_BACKOFF",
        "LPG_NOTIFY_SANDBOX_HOSTS",
        "LPG_DB_MAX_CONNECTIONS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
