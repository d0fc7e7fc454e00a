//! Conversation transcripts
//!
//! The driver reports every message it sees to a [`Transcript`].
//! [`WriterTranscript`] renders lines to any `io::Write`;
//! [`MemoryTranscript`] keeps them for inspection.

use std::io::Write;

use crate::error::Result;
use crate::message::ChatMessage;
use crate::task::Task;

/// `# User: {task}`
pub fn format_seed(task: &Task) -> String {
    format!("# User: {}", task)
}

/// `# {name}: {content}`
pub fn format_reply(message: &ChatMessage) -> String {
    format!("# {}: {}", message.author(), message.content)
}

/// `# {role} - {name}: '{content}'`
pub fn format_group_message(message: &ChatMessage) -> String {
    format!(
        "# {} - {}: '{}'",
        message.role,
        message.author(),
        message.content
    )
}

/// Sink for the messages of a run
pub trait Transcript: Send {
    /// The task the run was seeded with
    fn seed(&mut self, task: &Task) -> Result<()>;

    /// A single-agent reply outside any group chat
    fn reply(&mut self, message: &ChatMessage) -> Result<()>;

    /// A message produced by a group chat turn
    fn group_message(&mut self, message: &ChatMessage) -> Result<()>;
}

/// Writes transcript lines to a writer
pub struct WriterTranscript<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> WriterTranscript<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, line: &str) -> Result<()> {
        writeln!(self.out, "{}", line)?;
        self.out.flush()?;
        Ok(())
    }
}

impl WriterTranscript<std::io::Stdout> {
    /// Transcript on standard output
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> Transcript for WriterTranscript<W> {
    fn seed(&mut self, task: &Task) -> Result<()> {
        self.line(&format_seed(task))
    }

    fn reply(&mut self, message: &ChatMessage) -> Result<()> {
        self.line(&format_reply(message))
    }

    fn group_message(&mut self, message: &ChatMessage) -> Result<()> {
        self.line(&format_group_message(message))
    }
}

/// Keeps rendered lines in memory
#[derive(Debug, Default)]
pub struct MemoryTranscript {
    lines: Vec<String>,
}

impl MemoryTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl Transcript for MemoryTranscript {
    fn seed(&mut self, task: &Task) -> Result<()> {
        self.lines.push(format_seed(task));
        Ok(())
    }

    fn reply(&mut self, message: &ChatMessage) -> Result<()> {
        self.lines.push(format_reply(message));
        Ok(())
    }

    fn group_message(&mut self, message: &ChatMessage) -> Result<()> {
        self.lines.push(format_group_message(message));
        Ok(())
    }
}
