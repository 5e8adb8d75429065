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
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets.
    // LKP_API_KEY, the gateway credentials and LKP_WEBHOOK_ENDPOINTS (which carries endpoint
    // secrets) are deliberately absent.
    const DISPLAY_ENVS: [&str; 28] = [
        "RUST_LOG",
        "LKP_HOST",
        "LKP_PORT",
        "LKP_DATABASE_URL",
        "LKP_USE_X_FORWARDED_FOR",
        "LKP_USE_FORWARDED",
        "LKP_RETRY_SWEEP_INTERVAL",
        "LKP_EVENT_RETENTION_DAYS",
        "LKP_GATEWAY",
        "LKP_GATEWAY_ENABLED",
        "LKP_TIMESTAMP_TOLERANCE",
        "LKP_HTTP_TIMEOUT",
        "LKP_CHECKOUT_EXPIRY",
        "LKP_VA_EXPIRY",
        "LKP_DEFAULT_REDIRECT_URL",
        "LKP_AMOUNT_TOLERANCE",
        "LKP_SNAP_BASE_URL",
        "LKP_SNAP_PARTNER_ID",
        "LKP_SNAP_CHANNEL_ID",
        "LKP_SNAP_PARTNER_SERVICE_ID",
        "LKP_KIOSPAY_BASE_URL",
        "LKP_MANUAL_BANK_NAME",
        "LKP_MANUAL_ACCOUNT_NUMBER",
        "LKP_MANUAL_ACCOUNT_HOLDER",
        "LKP_MANUAL_IP_ALLOWLIST",
        "LKP_WEBHOOK_MAX_ATTEMPTS",
        "LKP_WEBHOOK_RETRY_DELAYS",
        "LKP_WEBHOOK_TIMEOUT",
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
