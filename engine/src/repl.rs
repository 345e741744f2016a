//! Interactive shell
//!
//! Reads one line at a time and routes it: built-in words (`help`, `exit`),
//! typed tool commands, small talk answered locally, and everything else as
//! a goal for the agent loop.

use std::io::{BufRead, Write};

use anyhow::Result;
use serde_json::{json, Value};
use tracing::debug;

use crate::handlers::{render_error, render_state, render_tool_result, OutputFormat};
use crate::session::Session;
use crate::tools::ToolRegistry;

const CAPABILITIES: &str = "\
CodeGen CLI - Capabilities

I am a repository-aware CLI coding assistant that works on the files in this workspace.

File operations: read_file, write_file, edit_file, multi_edit, delete_file
Search and discovery: list_files, find_files, grep
Web: fetch_url, search_web
System: run_command, manage_todos

Try: 'read README.md', 'glob **/*.rs', 'grep TODO', or describe a change in plain words.";

/// Outcome of one input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Print this text and keep going
    Say(String),
    /// Nothing to print
    Silent,
    /// Leave the shell
    Exit,
}

/// A locally answered line and the `explain` tag recorded in history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmallTalk {
    pub reply: String,
    pub explain: &'static str,
}

impl SmallTalk {
    fn new(reply: impl Into<String>, explain: &'static str) -> Self {
        Self {
            reply: reply.into(),
            explain,
        }
    }
}

/// Answer greetings, thanks, capability and identity questions, and
/// API key status without calling the model.
pub fn small_talk_reply(line: &str, key_var: &str, has_key: bool) -> Option<SmallTalk> {
    let s = line.trim().to_lowercase();
    let first_word = s
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| !c.is_alphanumeric());

    const GREETINGS: &[&str] = &[
        "hi", "hii", "hiii", "hello", "hey", "heyy", "heyyy", "hiya", "yo",
    ];
    if GREETINGS.contains(&s.trim_end_matches('!'))
        || (GREETINGS.contains(&first_word) && s.chars().count() <= 10)
    {
        return Some(SmallTalk::new(
            "Hello! How can I help you with your repository?",
            "greeting",
        ));
    }

    if matches!(
        s.as_str(),
        "sup" | "what's up" | "whats up" | "wassup" | "howdy" | "greetings"
    ) {
        return Some(SmallTalk::new(
            "Hey there! Ready to work on some code? What can I help you with?",
            "casual_greeting",
        ));
    }

    if matches!(
        s.as_str(),
        "thanks" | "thank you" | "thx" | "ty" | "appreciate it" | "thanks!"
    ) {
        return Some(SmallTalk::new(
            "You're welcome! Happy to help. Anything else you'd like to work on?",
            "thanks",
        ));
    }

    if s.contains("what can you do") || s.contains("what do you do") || s.contains("capabilities")
    {
        return Some(SmallTalk::new(CAPABILITIES, "capabilities_reply"));
    }

    if s.contains("your name") || s.contains("who are you") {
        return Some(SmallTalk::new(
            "I am CodeGen, a CLI coding assistant. I work on this repository's files.",
            "name_reply",
        ));
    }

    let mentions_key = ["api key", "apikey", "gemini key", "gemini api"]
        .iter()
        .any(|m| s.contains(m));
    let asks_status = ["set", "configured", "present", "loaded", "ok"]
        .iter()
        .any(|w| s.contains(w));
    if mentions_key && asks_status {
        return Some(if has_key {
            SmallTalk::new(
                format!("Yes, {key_var} is set and will be used."),
                "api_key_status_yes",
            )
        } else {
            SmallTalk::new(
                format!("No, {key_var} is not set. Run 'codegen set-key' or add it to your .env."),
                "api_key_status_no",
            )
        });
    }

    None
}

/// Parse a typed tool command.
///
/// `None` means the line is not a tool command. A line starting with `{` is
/// JSON; otherwise the first word must name a known tool and the remaining
/// words become positional arguments. Bare `ls` lists the workspace root.
pub fn parse_direct_command(
    line: &str,
    registry: &ToolRegistry,
) -> Option<Result<Value, serde_json::Error>> {
    let trimmed = line.trim();
    if trimmed.starts_with('{') {
        return Some(serde_json::from_str(trimmed));
    }

    let mut words = trimmed.split_whitespace();
    let first = words.next()?;
    if !registry.is_known_name(first) {
        return None;
    }

    let args: Vec<&str> = words.collect();
    if first.eq_ignore_ascii_case("ls") && args.is_empty() {
        return Some(Ok(json!({"tool": "ls", "args": ["."], "kwargs": {}})));
    }
    Some(Ok(json!({"tool": first, "args": args, "kwargs": {}})))
}

pub struct Repl {
    session: Session,
    format: OutputFormat,
}

impl Repl {
    pub fn new(session: Session, format: OutputFormat) -> Self {
        Self { session, format }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Welcome text: workspace, project type, API key status
    pub fn banner(&self) -> String {
        let config = self.session.config();
        let has_key = self.session.has_provider();
        let mut lines = vec![
            "CodeGen CLI - repository-aware coding assistant".to_string(),
            String::new(),
            format!("Workspace: {}", config.core.workspace.display()),
            format!("Project: {}", self.session.project().summary()),
            format!(
                "Gemini API key: {}",
                if has_key { "set" } else { "missing" }
            ),
            String::new(),
            "Tips:".to_string(),
            "  • Type 'help' for guidance or ask in natural language.".to_string(),
            "  • Non-destructive steps run immediately; destructive ones ask first.".to_string(),
        ];
        if !has_key {
            lines.push(format!(
                "  • Run 'codegen set-key' or add {} to your .env",
                config.llm.api_key_env
            ));
        }
        lines.join("\n")
    }

    fn help(&self) -> String {
        format!(
            "Ask in natural language, or type a tool command directly:\n\
             \x20 read README.md\n\
             \x20 ls\n\
             \x20 grep TODO\n\
             \x20 {{\"tool\": \"find_files\", \"args\": [\"**/*.rs\"]}}\n\
             \n\
             Tools:\n{}\n\
             \n\
             'exit' or 'quit' leaves the session.",
            self.session.dispatcher().registry().tool_listing()
        )
    }

    /// Handle one input line.
    pub async fn handle_line(&mut self, line: &str) -> Result<Reply> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Reply::Silent);
        }

        let low = trimmed.to_lowercase();
        if matches!(low.as_str(), "help" | "--help" | "-h") {
            return Ok(Reply::Say(self.help()));
        }
        if matches!(low.as_str(), "exit" | "quit") {
            return Ok(Reply::Exit);
        }

        match parse_direct_command(trimmed, self.session.dispatcher().registry()) {
            Some(Ok(payload)) => {
                let tool = payload
                    .get("tool")
                    .and_then(Value::as_str)
                    .unwrap_or("<unknown>")
                    .to_string();
                debug!(tool = %tool, "Direct tool command");
                let result = self.session.run_direct(trimmed, &payload).await;
                return Ok(Reply::Say(render_tool_result(&tool, &result, self.format)?));
            }
            Some(Err(e)) => {
                debug!("Unparseable tool command: {}", e);
                return Ok(Reply::Say("Could not parse tool invocation.".to_string()));
            }
            None => {}
        }

        let key_var = self.session.config().llm.api_key_env.clone();
        if let Some(talk) = small_talk_reply(trimmed, &key_var, self.session.has_provider()) {
            self.session
                .record(trimmed, json!({"steps": [], "explain": talk.explain}), json!([]))
                .await;
            return Ok(Reply::Say(talk.reply));
        }

        let rendered = match self.session.run_task(trimmed).await {
            Ok(state) => render_state(&state, self.format)?,
            Err(e) => render_error(&e, self.format)?,
        };
        Ok(Reply::Say(rendered))
    }
}

/// Run the shell until `exit`, end of input, or ctrl-c.
pub async fn run_repl(session: Session, format: OutputFormat) -> Result<()> {
    let mut repl = Repl::new(session, format);
    println!("{}", repl.banner());

    loop {
        let line = tokio::select! {
            line = read_prompt_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            println!("Exiting session.");
            return Ok(());
        };

        match repl.handle_line(&line).await? {
            Reply::Say(text) => println!("{}", text),
            Reply::Silent => {}
            Reply::Exit => {
                println!("Bye.");
                return Ok(());
            }
        }
    }
}

/// Prompt and read one line; `None` at end of input.
async fn read_prompt_line() -> Result<Option<String>> {
    let line = tokio::task::spawn_blocking(|| -> std::io::Result<Option<String>> {
        let mut stdout = std::io::stdout();
        write!(stdout, "\n> ")?;
        stdout.flush()?;

        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line.trim_end_matches(['\r', '\n']).to_string())),
        }
    })
    .await??;
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::confirmation::ConfirmationGate;
    use crate::tools::test_support;
    use tempfile::TempDir;

    fn session_in(temp: &TempDir) -> Session {
        let mut config = Config::default();
        config.core.history_path = temp.path().join("history.json");
        config.tools.todos_path = temp.path().join(".todos.json");
        config.set_workspace(temp.path()).unwrap();
        Session::with_provider(config, ConfirmationGate::auto_approve(), None).unwrap()
    }

    #[test]
    fn test_greetings() {
        for line in ["hi", "Hello!", "hey there", "HIYA"] {
            let talk = small_talk_reply(line, "GEMINI_API_KEY", true).unwrap();
            assert_eq!(talk.explain, "greeting", "line {line:?}");
        }
        assert!(small_talk_reply("history", "GEMINI_API_KEY", true).is_none());
        assert!(small_talk_reply("hello, please refactor main.rs", "K", true).is_none());
    }

    #[test]
    fn test_other_small_talk() {
        assert_eq!(
            small_talk_reply("thanks", "K", true).unwrap().explain,
            "thanks"
        );
        assert_eq!(
            small_talk_reply("what's up", "K", true).unwrap().explain,
            "casual_greeting"
        );
        assert_eq!(
            small_talk_reply("What can you do?", "K", true).unwrap().explain,
            "capabilities_reply"
        );
        assert_eq!(
            small_talk_reply("who are you", "K", true).unwrap().explain,
            "name_reply"
        );
        assert!(small_talk_reply("add a README to the project", "K", true).is_none());
    }

    #[test]
    fn test_api_key_status() {
        let yes = small_talk_reply("is my api key set?", "GEMINI_API_KEY", true).unwrap();
        assert_eq!(yes.explain, "api_key_status_yes");
        assert!(yes.reply.contains("GEMINI_API_KEY is set"));

        let no = small_talk_reply("is the gemini key configured", "GEMINI_API_KEY", false).unwrap();
        assert_eq!(no.explain, "api_key_status_no");
        assert!(no.reply.contains("set-key"));
    }

    #[test]
    fn test_parse_direct_command() {
        let (_temp, ctx, _) = test_support::context(&[]);
        let registry = ToolRegistry::builtin(&ctx);

        let payload = parse_direct_command("read README.md", &registry)
            .unwrap()
            .unwrap();
        assert_eq!(payload, json!({"tool": "read", "args": ["README.md"], "kwargs": {}}));

        let payload = parse_direct_command("ls", &registry).unwrap().unwrap();
        assert_eq!(payload["args"], json!(["."]));

        let payload = parse_direct_command(r#"{"tool": "grep", "args": ["x"]}"#, &registry)
            .unwrap()
            .unwrap();
        assert_eq!(payload["tool"], json!("grep"));

        assert!(parse_direct_command("{not json", &registry).unwrap().is_err());
        assert!(parse_direct_command("please add tests", &registry).is_none());
        assert!(parse_direct_command("task_complete done", &registry).is_none());
    }

    #[tokio::test]
    async fn test_builtin_words() {
        let temp = TempDir::new().unwrap();
        let mut repl = Repl::new(session_in(&temp), OutputFormat::Text);

        assert_eq!(repl.handle_line("   ").await.unwrap(), Reply::Silent);
        assert_eq!(repl.handle_line("QUIT").await.unwrap(), Reply::Exit);
        match repl.handle_line("help").await.unwrap() {
            Reply::Say(text) => assert!(text.contains("read_file")),
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_direct_command_runs_tool_and_records_history() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("notes.txt"), "alpha\nbeta\n").unwrap();
        let mut repl = Repl::new(session_in(&temp), OutputFormat::Text);

        match repl.handle_line("read notes.txt").await.unwrap() {
            Reply::Say(text) => {
                assert!(text.starts_with("✓ read"));
                assert!(text.contains("alpha"));
            }
            other => panic!("unexpected reply {other:?}"),
        }
        match repl.handle_line("{broken").await.unwrap() {
            Reply::Say(text) => assert_eq!(text, "Could not parse tool invocation."),
            other => panic!("unexpected reply {other:?}"),
        }

        let history = repl.session().history().load(10).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user, "read notes.txt");
        assert_eq!(history[0].results[0]["success"], json!(true));
    }

    #[tokio::test]
    async fn test_small_talk_recorded_and_goal_without_key() {
        let temp = TempDir::new().unwrap();
        let mut repl = Repl::new(session_in(&temp), OutputFormat::Text);

        assert_eq!(
            repl.handle_line("thanks").await.unwrap(),
            Reply::Say(
                "You're welcome! Happy to help. Anything else you'd like to work on?".into()
            )
        );
        let history = repl.session().history().load(10).await;
        assert_eq!(history[0].agent_plan["explain"], json!("thanks"));

        match repl.handle_line("refactor the parser").await.unwrap() {
            Reply::Say(text) => assert!(text.contains("Missing API key")),
            other => panic!("unexpected reply {other:?}"),
        }
        assert!(repl.banner().contains("Gemini API key: missing"));
    }
}
