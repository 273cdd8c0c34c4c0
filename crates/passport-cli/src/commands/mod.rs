//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command. Services are
//! configured from the environment through `PassportConfig`.

pub mod launch;
pub mod pipeline;
pub mod serve;
pub mod tools;

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

/// Load `.env.local` then `.env` from the working directory. Variables
/// already set in the environment win.
pub fn load_dotenv() {
    for filename in &[".env.local", ".env"] {
        let Ok(content) = std::fs::read_to_string(filename) else {
            continue;
        };
        for (key, value) in content.lines().filter_map(parse_env_line) {
            if std::env::var(key).is_err() {
                std::env::set_var(key, value);
            }
        }
        tracing::debug!("Loaded environment from '{}'", filename);
    }
}

fn parse_env_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let value = value.trim();
    let unquoted = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);
    Some((key.trim(), unquoted))
}
