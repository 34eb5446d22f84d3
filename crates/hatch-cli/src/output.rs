//! Formatted output helpers for CLI commands.
//!
//! Launcher failures are reported on stderr as `hatch: <kind> error: <detail>`
//! so they cannot be mistaken for the sandboxed command's own output.

use std::io::Write;

use hatch_common::constants::APP_NAME;
use hatch_common::error::{ErrorKind, HatchError};

/// Returns the report category of `err`; errors raised outside the
/// workspace count as internal.
#[must_use]
pub fn error_kind(err: &anyhow::Error) -> ErrorKind {
    err.downcast_ref::<HatchError>()
        .map_or(ErrorKind::Internal, HatchError::kind)
}

/// Renders the one-line report for `err`.
///
/// Workspace errors already name their cause in their message, so only
/// foreign errors have their source chain appended.
#[must_use]
pub fn format_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<HatchError>() {
        Some(hatch) => format!("{APP_NAME}: {} error: {hatch}", hatch.kind()),
        None => format!("{APP_NAME}: {} error: {err:#}", ErrorKind::Internal),
    }
}

/// Writes the report for `err` to stderr.
pub fn report_error(err: &anyhow::Error) {
    let _ = writeln!(std::io::stderr().lock(), "{}", format_error(err));
}

/// Formats a byte count into a human-readable string (e.g., "3.4 MiB").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_errors_keep_their_kind() {
        let err = anyhow::Error::from(HatchError::NotFound {
            kind: "executable",
            id: "/bin/nope".into(),
        });
        assert_eq!(error_kind(&err), ErrorKind::Input);
        assert_eq!(format_error(&err), "hatch: input error: executable not found: /bin/nope");
    }

    #[test]
    fn io_cause_is_reported_once() {
        let err = anyhow::Error::from(HatchError::Io {
            path: "/work/hatch-1".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        });
        assert_eq!(format_error(&err), "hatch: internal error: I/O error at /work/hatch-1: gone");
    }

    #[test]
    fn foreign_errors_are_internal() {
        let err = anyhow::anyhow!("boom");
        assert_eq!(format_error(&err), "hatch: internal error: boom");
    }

    #[test]
    fn format_bytes_picks_a_unit() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(3_565_158), "3.4 MiB");
        assert_eq!(format_bytes(2_147_483_648), "2.0 GiB");
    }
}
