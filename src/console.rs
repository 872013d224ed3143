//! Console front-end: single questions and an interactive REPL

use crate::orchestrator::{AgentError, AgentEvent, AgentObserver, Orchestrator};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

const PREVIEW_CHARS: usize = 400;

/// Prints loop progress to stdout
pub struct ConsoleObserver {
    verbose: bool,
}

impl ConsoleObserver {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl AgentObserver for ConsoleObserver {
    fn on_event(&self, event: &AgentEvent) {
        if !self.verbose {
            return;
        }
        println!("{}", render_event(event));
    }
}

/// Console text for one event
pub fn render_event(event: &AgentEvent) -> String {
    match event {
        AgentEvent::Thinking { text } => format!("\n[Thinking] {text}"),
        AgentEvent::ToolStarted { goal, code, .. } => format!("\n[{goal}]\n```python\n{code}\n```"),
        AgentEvent::ToolFinished { output, .. } => format!(">>> {}", preview(output)),
        AgentEvent::Chart { path, .. } => format!("[chart] {}", path.display()),
        AgentEvent::Answer { text } => format!("\n[Answer]\n{text}"),
    }
}

fn preview(output: &str) -> String {
    match output.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", output.get(..cut).unwrap_or(output)),
        None => output.to_string(),
    }
}

fn print_question(question: &str) {
    println!("\n{}", "=".repeat(60));
    println!("Q: {question}");
    println!("{}", "=".repeat(60));
}

/// Run one step, cancelling it on Ctrl-C
async fn run_step(agent: &mut Orchestrator, question: String) -> Result<String, AgentError> {
    let cancel = CancellationToken::new();
    let step = agent.step(Some(question), &cancel);
    tokio::pin!(step);

    loop {
        tokio::select! {
            result = &mut step => return result,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                println!("\n[cancelling]");
                cancel.cancel();
            }
        }
    }
}

/// Answer a single question
pub async fn ask(agent: Orchestrator, question: String) -> Result<String, AgentError> {
    let mut agent = agent.with_observer(Arc::new(ConsoleObserver::new(true)));
    print_question(&question);
    run_step(&mut agent, question).await
}

enum Input {
    Exit,
    Reset,
    Empty,
    Question(String),
}

fn classify_input(line: &str) -> Input {
    let line = line.trim();
    match line.to_lowercase().as_str() {
        "exit" | "quit" | "q" => Input::Exit,
        "reset" => Input::Reset,
        "" => Input::Empty,
        _ => Input::Question(line.to_string()),
    }
}

/// Interactive loop until exit, EOF, or Ctrl-C at the prompt
pub async fn chat(agent: Orchestrator) -> std::io::Result<()> {
    let mut agent = agent.with_observer(Arc::new(ConsoleObserver::new(true)));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("\nData Analysis Agent (prompt: {})", agent.prompt_version());
    println!("{}", "=".repeat(40));

    loop {
        print!("\nYou: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match classify_input(&line) {
            Input::Exit => break,
            Input::Empty => {}
            Input::Reset => {
                let cleared = agent.state().len();
                agent.reset();
                println!("[conversation reset: {cleared} turns cleared]");
            }
            Input::Question(question) => {
                print_question(&question);
                match run_step(&mut agent, question).await {
                    Ok(_) => {}
                    Err(AgentError::Cancelled) => println!("[cancelled; conversation unchanged]"),
                    Err(e) => eprintln!("Error: {e}"),
                }
            }
        }
    }
    Ok(())
}
