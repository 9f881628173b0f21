//! Desktop notification when a background task finishes.

use tracing::debug;

/// Show a modal dialog on macOS; a debug log line everywhere else.
pub async fn desktop_dialog(title: &str, message: &str) {
    #[cfg(target_os = "macos")]
    {
        let script = format!(
            "display dialog \"{}\" buttons {{\"OK\"}} default button \"OK\" with title \"{}\"",
            message.replace('"', "'"),
            title.replace('"', "'")
        );
        let status = tokio::process::Command::new("osascript")
            .arg("-e")
            .arg(script)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await;
        if let Err(e) = status {
            debug!("osascript unavailable: {}", e);
        }
    }

    #[cfg(not(target_os = "macos"))]
    debug!("{}: {}", title, message);
}
