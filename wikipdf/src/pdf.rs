use std::io::Write;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::{Error, Result};

/// Render a complete HTML document to PDF with WeasyPrint.
///
/// The HTML is staged in a temporary file that is removed afterwards.
pub fn generate_pdf(full_html: &str, output_path: &Path, weasyprint: &str) -> Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix("wikipdf-")
        .suffix(".html")
        .tempfile()
        .map_err(|e| Error::io(std::env::temp_dir(), e))?;
    if let Err(e) = tmp.write_all(full_html.as_bytes()).and_then(|_| tmp.flush()) {
        return Err(Error::io(tmp.path(), e));
    }

    debug!(input = %tmp.path().display(), output = %output_path.display(), weasyprint, "running WeasyPrint");
    let status = Command::new(weasyprint)
        .arg(tmp.path())
        .arg(output_path)
        .status()
        .map_err(|e| Error::Render(format!("cannot run {weasyprint}: {e}")))?;

    if !status.success() {
        return Err(Error::Render(format!("{weasyprint} exited with {status}")));
    }

    Ok(())
}
