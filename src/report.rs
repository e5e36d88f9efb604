use std::io::{self, Write};

use tracing::error;

/// Escapes a message for use as workflow command data.
pub fn escape_data(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

pub fn failure_command(message: &str) -> String {
    format!("::error::{}", escape_data(message))
}

/// Reports a failed run to the Actions runner. The caller sets the exit status.
pub fn set_failed(message: &str) {
    error!("{message}");

    let mut stdout = io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{}", failure_command(message)) {
        error!("Could not write failure to stdout: {e}");
    }
}
