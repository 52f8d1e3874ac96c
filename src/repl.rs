use std::io::{BufRead, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::augment::ContentAugmenter;
use crate::completion::{CompletionClient, StreamEvent};
use crate::config::Config;
use crate::error::CompletionError;
use crate::input::{InputEvent, InputMode, InputReader};
use crate::model::MessageRole;
use crate::terminal::{FAREWELL, Style, paint};
use crate::transcript::Transcript;

/// Why a chat session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Quit,
    /// The user submitted an empty message.
    Cancelled,
    EndOfInput,
    CompletionFailed,
}

impl SessionEnd {
    pub fn is_failure(self) -> bool {
        matches!(self, Self::CompletionFailed)
    }

    pub fn exit_code(self) -> ExitCode {
        if self.is_failure() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }
}

enum TurnOutcome {
    Answered,
    Skipped,
    Failed,
}

pub struct Repl<'a, R, W> {
    cfg: &'a Config,
    model: &'a str,
    client: &'a dyn CompletionClient,
    augmenter: &'a dyn ContentAugmenter,
    input: InputReader<R>,
    out: W,
    transcript: Transcript,
    fresh: bool,
    at_line_start: bool,
}

impl<'a, R: BufRead, W: Write> Repl<'a, R, W> {
    pub fn new(
        cfg: &'a Config,
        model: &'a str,
        client: &'a dyn CompletionClient,
        augmenter: &'a dyn ContentAugmenter,
        input: R,
        out: W,
    ) -> Self {
        Self {
            cfg,
            model,
            client,
            augmenter,
            input: InputReader::new(input, cfg.sentinels.clone()),
            out,
            transcript: Transcript::new(cfg.system_prompt.clone()),
            fresh: true,
            at_line_start: true,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn input_mode(&self) -> InputMode {
        self.input.mode()
    }

    pub async fn run(&mut self) -> Result<SessionEnd> {
        self.print_banner()?;

        loop {
            self.separate_turns()?;
            write!(self.out, "User: ").context("Failed to write to stdout")?;
            self.out.flush().context("Failed to flush stdout")?;
            self.fresh = false;

            let event = self.input.read_event().context("Failed to read stdin")?;
            self.at_line_start = true;

            match event {
                InputEvent::ModeChanged(InputMode::MultiLine) => {
                    let notice = format!(
                        "\n\nSwitched to multi-line input mode. Type '{}' to send message.",
                        self.cfg.sentinels.end.to_ascii_uppercase()
                    );
                    self.notice(Style::Info, &notice)?;
                }
                InputEvent::ModeChanged(InputMode::SingleLine) => {
                    self.notice(Style::Info, "\n\nSwitched to single-line input mode.")?;
                }
                InputEvent::ClearRequested => {
                    self.transcript.reset(self.cfg.system_prompt.clone());
                    debug!("transcript cleared");
                    self.notice(Style::Info, "\n\nChat history cleared.\n")?;
                    self.fresh = true;
                }
                InputEvent::Quit => return Ok(SessionEnd::Quit),
                InputEvent::EndOfInput => {
                    self.notice(Style::Error, FAREWELL)?;
                    return Ok(SessionEnd::EndOfInput);
                }
                InputEvent::Message(text) => {
                    writeln!(self.out).context("Failed to write to stdout")?;
                    if text.trim().is_empty() {
                        self.notice(Style::Error, FAREWELL)?;
                        return Ok(SessionEnd::Cancelled);
                    }

                    let text = self.augment(text).await?;
                    match self.turn(text).await? {
                        TurnOutcome::Answered | TurnOutcome::Skipped => {}
                        TurnOutcome::Failed => return Ok(SessionEnd::CompletionFailed),
                    }
                }
            }
        }
    }

    async fn augment(&mut self, text: String) -> Result<String> {
        if !self.augmenter.contains_links(&text) {
            return Ok(text);
        }

        self.notice(Style::Info, "\n--- BROWSING THE WEB ---\n")?;
        let expanded = self.augmenter.expand(&text).await;
        debug!(
            original_len = text.len(),
            expanded_len = expanded.len(),
            "augmented user message"
        );
        Ok(expanded)
    }

    async fn turn(&mut self, text: String) -> Result<TurnOutcome> {
        if let Err(err) = self.transcript.append(MessageRole::User, text) {
            warn!(error = %err, "user message rejected");
            self.notice(Style::Error, &err.to_string())?;
            return Ok(TurnOutcome::Skipped);
        }

        debug!(
            model = %self.model,
            message_count = self.transcript.len(),
            "starting turn"
        );
        let mut stream = match self.client.send(self.transcript.snapshot(), self.model).await {
            Ok(stream) => stream,
            Err(err) => {
                self.report_failure(&err)?;
                return Ok(TurnOutcome::Failed);
            }
        };

        let mut reply = String::new();
        loop {
            match stream.next_event().await {
                Ok(StreamEvent::Fragment(fragment)) => {
                    write!(self.out, "{}", paint(Style::Success, &fragment))
                        .context("Failed to write to stdout")?;
                    self.out.flush().context("Failed to flush stdout")?;
                    self.at_line_start = fragment.ends_with('\n');
                    reply.push_str(&fragment);
                }
                Ok(StreamEvent::Done) => break,
                Err(err) => {
                    self.report_failure(&err)?;
                    return Ok(TurnOutcome::Failed);
                }
            }
        }

        if reply.is_empty() {
            self.transcript.withdraw_pending_user();
            self.notice(Style::Warning, "The model returned no content.")?;
            return Ok(TurnOutcome::Skipped);
        }

        debug!(reply_len = reply.len(), "turn completed");
        if let Err(err) = self.transcript.append(MessageRole::Assistant, reply) {
            warn!(error = %err, "assistant reply rejected");
            self.transcript.withdraw_pending_user();
            self.notice(Style::Warning, &err.to_string())?;
            return Ok(TurnOutcome::Skipped);
        }
        Ok(TurnOutcome::Answered)
    }

    fn report_failure(&mut self, err: &CompletionError) -> Result<()> {
        warn!(error = %err, "completion failed");
        self.notice(Style::Error, &err.to_string())
    }

    fn print_banner(&mut self) -> Result<()> {
        let sentinels = &self.cfg.sentinels;
        let lines = [
            (
                Style::Info,
                format!(
                    "Start chatting with the {} model (type '{}' to stop)! Type '{}' to switch input mode.",
                    self.model, sentinels.quit, sentinels.mode_toggle
                ),
            ),
            (
                Style::Success,
                "Tip: During the chat, you can switch between single-line and multi-line input modes."
                    .to_string(),
            ),
            (
                Style::Warning,
                format!(
                    "Type '{}' to toggle between these modes. In multi-line mode, type '{}' to send your message. \
                     Or type '{}' to clear the current chat history.",
                    sentinels.mode_toggle,
                    sentinels.end.to_ascii_uppercase(),
                    sentinels.clear_history
                ),
            ),
        ];
        for (style, line) in lines {
            self.notice(style, &line)?;
        }
        Ok(())
    }

    /// Ends the current output line if needed, then prints `text` on its own.
    fn notice(&mut self, style: Style, text: &str) -> Result<()> {
        if !self.at_line_start {
            writeln!(self.out).context("Failed to write to stdout")?;
        }
        writeln!(self.out, "{}", paint(style, text)).context("Failed to write to stdout")?;
        self.at_line_start = true;
        Ok(())
    }

    /// Leaves exactly one blank line between turns.
    fn separate_turns(&mut self) -> Result<()> {
        if !self.at_line_start {
            writeln!(self.out).context("Failed to write to stdout")?;
        }
        if !self.fresh {
            writeln!(self.out).context("Failed to write to stdout")?;
        }
        self.at_line_start = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{Repl, SessionEnd};
    use crate::augment::{AugmentFuture, ContentAugmenter, Passthrough};
    use crate::completion::StreamEvent;
    use crate::completion::testing::{ScriptedClient, ScriptedTurn};
    use crate::config::{Config, Sentinels};
    use crate::error::CompletionError;
    use crate::input::InputMode;
    use crate::model::{Message, MessageRole};

    fn test_config() -> Config {
        Config {
            api_key: "sk-test".to_string(),
            api_base_url: "http://localhost:9/v1".to_string(),
            model: None,
            system_prompt: "sys".to_string(),
            model_timeout_secs: 5,
            model_filter: "gpt".to_string(),
            augment_links: false,
            augment_max_chars: 100,
            sentinels: Sentinels::default(),
        }
    }

    struct Session {
        end: SessionEnd,
        transcript: Vec<Message>,
        mode: InputMode,
        output: String,
    }

    async fn run_session(
        input: &str,
        client: &ScriptedClient,
        augmenter: &dyn ContentAugmenter,
    ) -> Session {
        let cfg = test_config();
        let mut out = Vec::new();
        let mut repl = Repl::new(
            &cfg,
            "gpt-test",
            client,
            augmenter,
            Cursor::new(input.as_bytes().to_vec()),
            &mut out,
        );
        let end = repl.run().await.expect("session should not hit I/O errors");
        let transcript = repl.transcript().snapshot().to_vec();
        let mode = repl.input_mode();
        drop(repl);
        Session {
            end,
            transcript,
            mode,
            output: String::from_utf8(out).expect("output should be utf-8"),
        }
    }

    #[tokio::test]
    async fn quit_ends_session_without_network_call() {
        let client = ScriptedClient::new(Vec::new());
        let session = run_session("quit\n", &client, &Passthrough).await;

        assert_eq!(session.end, SessionEnd::Quit);
        assert!(!session.end.is_failure());
        assert_eq!(session.transcript, vec![Message::system("sys")]);
        assert_eq!(client.call_count(), 0);
        assert!(session.output.contains("Start chatting with the gpt-test model"));
    }

    #[tokio::test]
    async fn turn_streams_fragments_and_commits_full_reply() {
        let client = ScriptedClient::new(vec![ScriptedClient::reply(&["Hel", "lo", " there"])]);
        let session = run_session("hello\nquit\n", &client, &Passthrough).await;

        assert_eq!(session.end, SessionEnd::Quit);
        assert_eq!(
            session.transcript,
            vec![
                Message::system("sys"),
                Message::user("hello"),
                Message::assistant("Hello there"),
            ]
        );
        for fragment in ["Hel", "lo", " there"] {
            assert!(session.output.contains(fragment), "output: {}", session.output);
        }

        let calls = client.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, vec![Message::system("sys"), Message::user("hello")]);
        assert_eq!(calls[0].1, "gpt-test");
    }

    #[tokio::test]
    async fn system_message_stays_first_across_turns() {
        let client = ScriptedClient::new(vec![
            ScriptedClient::reply(&["one"]),
            ScriptedClient::reply(&["two"]),
        ]);
        let session = run_session("a\nb\nquit\n", &client, &Passthrough).await;

        assert_eq!(session.transcript.len(), 5);
        assert_eq!(session.transcript[0].role, MessageRole::System);
        let calls = client.calls.borrow();
        assert!(calls.iter().all(|(messages, _)| messages[0].role == MessageRole::System));
        assert_eq!(calls[1].0.len(), 4);
    }

    #[tokio::test]
    async fn clear_resets_to_fresh_session() {
        let client = ScriptedClient::new(vec![
            ScriptedClient::reply(&["first"]),
            ScriptedClient::reply(&["second"]),
        ]);
        let session = run_session("a\n!CLEAR\nb\nquit\n", &client, &Passthrough).await;

        assert_eq!(
            session.transcript,
            vec![
                Message::system("sys"),
                Message::user("b"),
                Message::assistant("second"),
            ]
        );
        assert_eq!(
            client.calls.borrow()[1].0,
            vec![Message::system("sys"), Message::user("b")]
        );
        assert!(session.output.contains("Chat history cleared."));
    }

    #[tokio::test]
    async fn multi_line_message_is_sent_joined() {
        let client = ScriptedClient::new(vec![ScriptedClient::reply(&["ok"])]);
        let session =
            run_session("~!\npara one\n\npara two\nEND\n~!\nquit\n", &client, &Passthrough).await;

        assert_eq!(session.end, SessionEnd::Quit);
        assert_eq!(session.mode, InputMode::SingleLine);
        assert_eq!(session.transcript[1], Message::user("para one\n\npara two"));
        assert!(session.output.contains("Switched to multi-line input mode."));
        assert!(session.output.contains("Switched to single-line input mode."));
    }

    #[tokio::test]
    async fn mode_toggle_produces_no_message() {
        let client = ScriptedClient::new(Vec::new());
        let session = run_session("~!\n~!\n~!\n", &client, &Passthrough).await;

        assert_eq!(session.end, SessionEnd::EndOfInput);
        assert_eq!(session.mode, InputMode::MultiLine);
        assert_eq!(session.transcript, vec![Message::system("sys")]);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_submission_cancels_session_cleanly() {
        let client = ScriptedClient::new(Vec::new());
        let session = run_session("   \nhello\n", &client, &Passthrough).await;

        assert_eq!(session.end, SessionEnd::Cancelled);
        assert!(!session.end.is_failure());
        assert_eq!(client.call_count(), 0);
        assert!(session.output.contains("Exiting..."));
    }

    #[tokio::test]
    async fn empty_multi_line_submission_cancels_session() {
        let client = ScriptedClient::new(Vec::new());
        let session = run_session("~!\nend\n", &client, &Passthrough).await;
        assert_eq!(session.end, SessionEnd::Cancelled);
    }

    #[tokio::test]
    async fn refused_request_keeps_user_message_only() {
        let client = ScriptedClient::new(vec![ScriptedTurn::Refused(CompletionError::new(
            "connection refused",
        ))]);
        let session = run_session("hello\nquit\n", &client, &Passthrough).await;

        assert_eq!(session.end, SessionEnd::CompletionFailed);
        assert_eq!(
            session.transcript,
            vec![Message::system("sys"), Message::user("hello")]
        );
        assert!(session.output.contains("Error during chat: connection refused"));
    }

    #[tokio::test]
    async fn mid_stream_failure_discards_partial_reply() {
        let client = ScriptedClient::new(vec![ScriptedTurn::Reply(vec![
            Ok(StreamEvent::Fragment("partial".to_string())),
            Err(CompletionError::new("reset by peer")),
        ])]);
        let session = run_session("hello\nquit\n", &client, &Passthrough).await;

        assert_eq!(session.end, SessionEnd::CompletionFailed);
        assert_eq!(
            session.transcript,
            vec![Message::system("sys"), Message::user("hello")]
        );
        assert!(session.output.contains("partial"));
        assert!(session.output.contains("reset by peer"));
    }

    #[tokio::test]
    async fn empty_reply_is_not_committed_and_turns_keep_alternating() {
        let client = ScriptedClient::new(vec![
            ScriptedClient::reply(&[]),
            ScriptedClient::reply(&["answer"]),
        ]);
        let session = run_session("first\nsecond\nquit\n", &client, &Passthrough).await;

        assert_eq!(session.end, SessionEnd::Quit);
        assert_eq!(
            session.transcript,
            vec![
                Message::system("sys"),
                Message::user("second"),
                Message::assistant("answer"),
            ]
        );
        assert!(session.output.contains("The model returned no content."));
    }

    #[tokio::test]
    async fn turns_are_separated_by_exactly_one_blank_line() {
        let client = ScriptedClient::new(vec![
            ScriptedClient::reply(&["no newline"]),
            ScriptedClient::reply(&["with newline\n"]),
        ]);
        colored::control::set_override(false);
        let session = run_session("a\nb\nquit\n", &client, &Passthrough).await;

        assert!(
            session.output.contains("no newline\n\nUser: "),
            "output: {:?}",
            session.output
        );
        assert!(
            session.output.contains("with newline\n\nUser: "),
            "output: {:?}",
            session.output
        );
        assert!(!session.output.contains("\n\n\nUser: "), "output: {:?}", session.output);
    }

    struct Expanding;

    impl ContentAugmenter for Expanding {
        fn contains_links(&self, text: &str) -> bool {
            text.contains("http")
        }

        fn expand<'a>(&'a self, text: &'a str) -> AugmentFuture<'a> {
            Box::pin(async move { format!("{text}\n\nContent of link:\npage text") })
        }
    }

    #[tokio::test]
    async fn augmented_text_is_what_reaches_the_model() {
        let client = ScriptedClient::new(vec![ScriptedClient::reply(&["ok"])]);
        let session = run_session("read http://x.test\nquit\n", &client, &Expanding).await;

        assert_eq!(
            session.transcript[1],
            Message::user("read http://x.test\n\nContent of link:\npage text")
        );
        assert!(session.output.contains("BROWSING THE WEB"));
    }

    #[tokio::test]
    async fn end_of_input_stops_session_cleanly() {
        let client = ScriptedClient::new(vec![ScriptedClient::reply(&["hi"])]);
        let session = run_session("hello\n", &client, &Passthrough).await;

        assert_eq!(session.end, SessionEnd::EndOfInput);
        assert_eq!(session.transcript.len(), 3);
    }
}
