//! Output rendering for chat sessions.
//!
//! The session pushes reply fragments into a [`Renderer`] as they arrive and polls it for
//! interruption between fragments.  [`PlainTextRenderer`] writes to the terminal;
//! [`CollectingRenderer`] records everything for embedding and tests.

use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// ANSI escape code for dim text (used for informational lines).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for conversation titles).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering chat output.
pub trait Renderer: Send {
    /// Print a fragment of reply text.
    ///
    /// This is called incrementally as fragments are streamed from the API.
    fn print_text(&mut self, text: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Announce a conversation's new title.
    fn print_title(&mut self, title: &str) {
        self.print_info(&format!("[title: {title}]"));
    }

    /// Called when a reply is complete.
    fn finish_response(&mut self);

    /// Called when the stream is interrupted by the user.
    fn print_interrupted(&mut self) {}

    /// Returns true if streaming should be interrupted.
    fn should_interrupt(&self) -> bool {
        false
    }
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    line_start: bool,
    interrupted: Option<Arc<AtomicBool>>,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            line_start: true,
            interrupted: None,
        }
    }

    /// Attaches an interrupt flag to the renderer.
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(interrupted);
        self
    }

    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn styled(&self, color: &str, text: &str) -> String {
        if self.use_color {
            format!("{color}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    fn ensure_line_start(&mut self) {
        if !self.line_start {
            println!();
            self.line_start = true;
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        print!("{text}");
        self.line_start = text.ends_with('\n');
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        self.ensure_line_start();
        eprintln!("{}", self.styled(ANSI_RED, &format!("Error: {error}")));
    }

    fn print_info(&mut self, info: &str) {
        self.ensure_line_start();
        println!("{}", self.styled(ANSI_DIM, info));
        self.flush();
    }

    fn print_title(&mut self, title: &str) {
        self.ensure_line_start();
        println!("{}", self.styled(ANSI_CYAN, &format!("[title: {title}]")));
        self.flush();
    }

    fn finish_response(&mut self) {
        self.ensure_line_start();
        self.flush();
    }

    fn print_interrupted(&mut self) {
        self.ensure_line_start();
        println!("{}", self.styled(ANSI_DIM, "[interrupted]"));
        self.flush();
    }

    fn should_interrupt(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// A renderer that records everything it is given.
///
/// Optionally requests interruption once a given number of fragments has been printed.
#[derive(Debug, Default, Clone)]
pub struct CollectingRenderer {
    pub fragments: Vec<String>,
    pub errors: Vec<String>,
    pub infos: Vec<String>,
    pub titles: Vec<String>,
    pub finished: usize,
    pub interrupted: usize,
    interrupt_after: Option<usize>,
}

impl CollectingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for interruption after `fragments` fragments have been printed.
    pub fn interrupt_after(mut self, fragments: usize) -> Self {
        self.interrupt_after = Some(fragments);
        self
    }

    /// The fragments printed so far, concatenated.
    pub fn text(&self) -> String {
        self.fragments.concat()
    }
}

impl Renderer for CollectingRenderer {
    fn print_text(&mut self, text: &str) {
        self.fragments.push(text.to_string());
    }

    fn print_error(&mut self, error: &str) {
        self.errors.push(error.to_string());
    }

    fn print_info(&mut self, info: &str) {
        self.infos.push(info.to_string());
    }

    fn print_title(&mut self, title: &str) {
        self.titles.push(title.to_string());
    }

    fn finish_response(&mut self) {
        self.finished += 1;
    }

    fn print_interrupted(&mut self) {
        self.interrupted += 1;
    }

    fn should_interrupt(&self) -> bool {
        self.interrupt_after
            .is_some_and(|limit| self.fragments.len() >= limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
        assert!(!renderer.should_interrupt());
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
        assert_eq!(renderer.styled(ANSI_RED, "x"), "x");
    }

    #[test]
    fn interrupt_flag_is_observed() {
        let flag = Arc::new(AtomicBool::new(false));
        let renderer = PlainTextRenderer::with_color(false).with_interrupt(flag.clone());
        assert!(!renderer.should_interrupt());
        flag.store(true, Ordering::Relaxed);
        assert!(renderer.should_interrupt());
    }

    #[test]
    fn collecting_renderer_interrupts_after_limit() {
        let mut renderer = CollectingRenderer::new().interrupt_after(2);
        renderer.print_text("a");
        assert!(!renderer.should_interrupt());
        renderer.print_text("b");
        assert!(renderer.should_interrupt());
        assert_eq!(renderer.text(), "ab");
    }
}
