//! Output rendering abstraction for gantry.
//!
//! Defines the [`Renderer`] trait that decouples the agent loop from the
//! display layer. [`StdoutRenderer`] streams tokens straight to the
//! terminal; [`SubAgentRenderer`] shows a delegated agent's progress as an
//! indented trace.

use colored::Colorize;
use serde_json::{Map, Value};
use std::io::{self, Write};

use crate::format;
use crate::provider::ProviderError;

/// Receives everything the agent loop wants to show the operator.
pub trait Renderer: Send {
    /// Render a single text fragment as it arrives.
    fn render_token(&mut self, token: &str);

    /// A tool is about to run.
    fn render_tool_start(&mut self, name: &str, args: &Map<String, Value>);

    /// A tool finished; `result` always carries `success`.
    fn render_tool_result(&mut self, name: &str, result: &Value);

    /// Informational line, e.g. "max rounds reached".
    fn render_notice(&mut self, message: &str);

    /// Called when the turn is complete.
    fn render_done(&mut self);

    /// Called when an error ends the turn.
    fn render_error(&mut self, err: &str);
}

/// Renders streaming output directly to stdout.
///
/// Each token is printed immediately with an explicit flush so the user
/// sees a "typing" effect.
pub struct StdoutRenderer {
    /// Whether the cursor sits mid-line after streamed text.
    mid_line: bool,
}

impl StdoutRenderer {
    pub fn new() -> Self {
        Self { mid_line: false }
    }

    fn break_line(&mut self) {
        if self.mid_line {
            println!();
            self.mid_line = false;
        }
    }
}

impl Default for StdoutRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for StdoutRenderer {
    fn render_token(&mut self, token: &str) {
        print!("{}", token);
        // Flush immediately so each token appears as it arrives
        io::stdout().flush().ok();
        self.mid_line = !token.ends_with('\n');
    }

    fn render_tool_start(&mut self, name: &str, args: &Map<String, Value>) {
        self.break_line();
        println!("{}", format::format_tool_call(name, args));
    }

    fn render_tool_result(&mut self, name: &str, result: &Value) {
        println!("{}", format::format_tool_result(name, result));
    }

    fn render_notice(&mut self, message: &str) {
        self.break_line();
        println!("{}", message.yellow());
    }

    fn render_done(&mut self) {
        self.break_line();
        println!();
    }

    fn render_error(&mut self, err: &str) {
        self.break_line();
        eprintln!("{} {}", "error:".red().bold(), err);
    }
}

/// Shows a delegated sub-agent's progress without streaming its text.
pub struct SubAgentRenderer {
    model: String,
}

impl SubAgentRenderer {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into() }
    }
}

impl Renderer for SubAgentRenderer {
    fn render_token(&mut self, _token: &str) {}

    fn render_tool_start(&mut self, name: &str, args: &Map<String, Value>) {
        println!("  {} {}", "↳".magenta(), format::format_tool_call(name, args));
    }

    fn render_tool_result(&mut self, name: &str, result: &Value) {
        println!("    {}", format::format_tool_result(name, result));
    }

    fn render_notice(&mut self, message: &str) {
        println!("  {} {}", "↳".magenta(), message.yellow());
    }

    fn render_done(&mut self) {
        println!("  {} {}", "↳".magenta(), format!("sub-agent ({}) finished", self.model).dimmed());
    }

    fn render_error(&mut self, err: &str) {
        eprintln!("  {} {} {}", "↳".magenta(), "error:".red().bold(), err);
    }
}

/// Renders an error chain, adding the provider's remediation hint if it has one.
pub fn describe_error(err: &anyhow::Error) -> String {
    let hint = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<ProviderError>())
        .and_then(ProviderError::hint);
    match hint {
        Some(hint) => format!("{err:#} ({hint})"),
        None => format!("{err:#}"),
    }
}

/// Records every callback, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub text: String,
    pub tools: Vec<String>,
    pub notices: Vec<String>,
    pub errors: Vec<String>,
    pub done: usize,
}

#[cfg(test)]
impl Renderer for RecordingRenderer {
    fn render_token(&mut self, token: &str) {
        self.text.push_str(token);
    }

    fn render_tool_start(&mut self, name: &str, _args: &Map<String, Value>) {
        self.tools.push(name.to_string());
    }

    fn render_tool_result(&mut self, _name: &str, _result: &Value) {}

    fn render_notice(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }

    fn render_done(&mut self) {
        self.done += 1;
    }

    fn render_error(&mut self, err: &str) {
        self.errors.push(err.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_error_adds_hint() {
        let err = anyhow::Error::from(ProviderError::Auth {
            status: 401,
            message: "invalid x-api-key".into(),
        });
        let text = describe_error(&err);
        assert!(text.starts_with("Authentication rejected (HTTP 401)"));
        assert!(text.ends_with("(check your API key, then retry the prompt)"));

        let plain = anyhow::anyhow!("disk full");
        assert_eq!(describe_error(&plain), "disk full");
    }

    #[test]
    fn test_recording_renderer_collects() {
        let mut renderer = RecordingRenderer::default();
        renderer.render_token("he");
        renderer.render_token("llo");
        renderer.render_notice("interrupted");
        renderer.render_done();
        assert_eq!(renderer.text, "hello");
        assert_eq!(renderer.notices, vec!["interrupted".to_string()]);
        assert_eq!(renderer.done, 1);
    }
}
