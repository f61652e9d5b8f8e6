//! Audit trail for approval decisions and tool results.
//!
//! Records are appended in dispatch order with secrets masked. Two
//! verbosity levels: `full` keeps a redacted argument preview, `meta`
//! records byte counts only. Error previews are always single-line.

use std::io::Write;
use std::sync::Mutex;

use tracing::warn;

use crate::parser::ExecCall;
use crate::redact::redact_secrets;
use crate::tools::ToolResult;

/// Audit verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    /// Redacted argument previews.
    Full,
    /// Byte counts only.
    Meta,
}

impl AuditLevel {
    /// Permissive parse; anything unrecognized is `Full`.
    pub fn parse(v: &str) -> Self {
        match v.trim().to_lowercase().as_str() {
            "meta" => AuditLevel::Meta,
            _ => AuditLevel::Full,
        }
    }

    fn header(self) -> &'static str {
        match self {
            AuditLevel::Meta => "\n### Audit (meta)\n",
            AuditLevel::Full => "\n### Audit\n",
        }
    }
}

/// Append-only audit writer over any sink (session log file, buffer).
pub struct AuditLog {
    sink: Mutex<Box<dyn Write + Send>>,
    level: AuditLevel,
}

impl AuditLog {
    pub fn new(sink: Box<dyn Write + Send>, level: AuditLevel) -> Self {
        Self {
            sink: Mutex::new(sink),
            level,
        }
    }

    /// Record one approval decision.
    pub fn record_approval(&self, call: &ExecCall, approved: bool) {
        let ts = now();
        let decision = if approved { "allow" } else { "deny" };
        let args = redact_secrets(&preview_args(&call.args_raw));
        let line = format!(
            "- {ts} approval {decision} tool={} args={:?}\n",
            call.tool, args
        );
        self.write(&format!("{}{}", self.level.header(), line));
    }

    /// Record a batch of tool results, index-aligned with its calls.
    pub fn record_results(&self, calls: &[ExecCall], results: &[ToolResult]) {
        if calls.is_empty() || results.is_empty() {
            return;
        }
        let mut out = String::from(self.level.header());
        let ts = now();
        for (call, r) in calls.iter().zip(results.iter()) {
            let err_preview = if r.error.trim().is_empty() {
                String::new()
            } else {
                first_line(&redact_secrets(&r.error))
            };
            let out_bytes = r.output.trim().len();
            match self.level {
                AuditLevel::Meta => {
                    out.push_str(&format!(
                        "- {ts} tool={} ok={} args_bytes={} output_bytes={} error={:?}\n",
                        call.tool,
                        r.ok,
                        call.args_raw.trim().len(),
                        out_bytes,
                        err_preview
                    ));
                }
                AuditLevel::Full => {
                    let args = redact_secrets(&preview_args(&call.args_raw));
                    out.push_str(&format!(
                        "- {ts} tool={} ok={} args={:?} output_bytes={} error={:?}\n",
                        call.tool, r.ok, args, out_bytes, err_preview
                    ));
                }
            }
        }
        self.write(&out);
    }

    fn write(&self, content: &str) {
        let mut sink = match self.sink.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = sink.write_all(content.as_bytes()) {
            warn!("audit write failed: {e}");
        }
    }
}

fn now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Cap an argument string for log display.
pub fn preview_args(args: &str) -> String {
    let args = args.trim();
    if args.len() <= 120 {
        return args.to_string();
    }
    let mut end = 120;
    while !args.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &args[..end])
}

pub(crate) fn normalize_newlines(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

pub(crate) fn first_line(s: &str) -> String {
    let s = normalize_newlines(s);
    match s.find('\n') {
        Some(idx) => s[..idx].trim().to_string(),
        None => s.trim().to_string(),
    }
}

/// Render a result batch for feeding back to the conversation loop.
pub fn format_tool_results(results: &[ToolResult]) -> String {
    let mut sb = String::from("TOOL_RESULTS:\n");
    for r in results {
        sb.push_str(&format!("- tool: {}\n", r.tool));
        sb.push_str(&format!("  ok: {}\n", r.ok));
        if !r.error.is_empty() {
            sb.push_str(&format!("  error: {}\n", r.error.replace('\n', "\\n")));
        }
        if !r.output.is_empty() {
            let mut out = normalize_newlines(&r.output).trim().to_string();
            if out.len() > 2000 {
                let mut end = 2000;
                while !out.is_char_boundary(end) {
                    end -= 1;
                }
                out.truncate(end);
                out.push_str("\n[TRUNCATED]");
            }
            sb.push_str("  output: |\n");
            for line in out.lines() {
                sb.push_str(&format!("    {line}\n"));
            }
        }
        sb.push('\n');
    }
    sb.push_str("If you need to call tools again, output [EXEC:tool {json_args}] only.\n");
    sb
}

/// Meta variant: byte counts plus a redacted first-line preview.
pub fn format_tool_results_meta(results: &[ToolResult]) -> String {
    let mut sb = String::from("TOOL_RESULTS_META:\n");
    for r in results {
        sb.push_str(&format!("- tool: {}\n", r.tool));
        sb.push_str(&format!("  ok: {}\n", r.ok));
        if !r.error.trim().is_empty() {
            sb.push_str("  error: |\n");
            for line in normalize_newlines(&redact_secrets(&r.error)).lines() {
                sb.push_str(&format!("    {line}\n"));
            }
        }
        let out = r.output.trim();
        sb.push_str(&format!("  output_bytes: {}\n", out.len()));
        if !out.is_empty() {
            let first = redact_secrets(&first_line(out));
            sb.push_str("  output_preview: |\n");
            sb.push_str(&format!("    {first}\n"));
        }
    }
    sb.trim_end_matches('\n').to_string()
}
