use std::io::{self, BufRead};

use crate::config::Sentinels;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    SingleLine,
    MultiLine,
}

/// What one read from the terminal amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Message(String),
    ModeChanged(InputMode),
    ClearRequested,
    Quit,
    EndOfInput,
}

pub struct InputReader<R> {
    reader: R,
    mode: InputMode,
    sentinels: Sentinels,
}

impl<R: BufRead> InputReader<R> {
    pub fn new(reader: R, sentinels: Sentinels) -> Self {
        Self {
            reader,
            mode: InputMode::SingleLine,
            sentinels,
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn read_event(&mut self) -> io::Result<InputEvent> {
        match self.mode {
            InputMode::SingleLine => self.read_single_line(),
            InputMode::MultiLine => self.read_multi_line(),
        }
    }

    fn read_single_line(&mut self) -> io::Result<InputEvent> {
        let Some(line) = self.read_line()? else {
            return Ok(InputEvent::EndOfInput);
        };

        if line == self.sentinels.mode_toggle {
            self.mode = InputMode::MultiLine;
            return Ok(InputEvent::ModeChanged(self.mode));
        }
        if line.eq_ignore_ascii_case(&self.sentinels.quit) {
            return Ok(InputEvent::Quit);
        }
        if line.eq_ignore_ascii_case(&self.sentinels.clear_history) {
            return Ok(InputEvent::ClearRequested);
        }

        Ok(InputEvent::Message(line))
    }

    fn read_multi_line(&mut self) -> io::Result<InputEvent> {
        let mut lines = Vec::new();

        loop {
            let Some(line) = self.read_line()? else {
                return Ok(InputEvent::EndOfInput);
            };

            if line == self.sentinels.mode_toggle {
                self.mode = InputMode::SingleLine;
                return Ok(InputEvent::ModeChanged(self.mode));
            }
            if line.eq_ignore_ascii_case(&self.sentinels.end) {
                break;
            }
            lines.push(line);
        }

        let message = lines.join("\n");
        if message.eq_ignore_ascii_case(&self.sentinels.clear_history) {
            return Ok(InputEvent::ClearRequested);
        }
        Ok(InputEvent::Message(message))
    }

    /// Returns `None` at end of input. Only the line terminator is stripped.
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }

        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }
}
