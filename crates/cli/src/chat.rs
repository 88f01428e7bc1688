//! `obspilot chat`: the interactive REPL.
//!
//! Each line runs one full turn; the final state is carried into the
//! next line so follow-ups ("now chart it") see the cached rows.

use op_domain::message::Role;
use op_domain::state::ConversationState;
use op_engine::Engine;

pub async fn run(engine: &Engine) -> anyhow::Result<()> {
    let mut rl = rustyline::DefaultEditor::new()?;

    eprintln!("ObsPilot interactive chat");
    eprintln!("Ask about runs, latency, tokens, or charts. Ctrl+D to exit.");
    eprintln!();

    let mut state: Option<ConversationState> = None;
    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed == "exit" || trimmed == "quit" {
                    break;
                }
                rl.add_history_entry(&line).ok();

                // Replies from this turn start after the transcript so
                // far plus the new human message.
                let seen = state.as_ref().map(|s| s.messages.len()).unwrap_or(0) + 1;
                match engine.advance(trimmed, state.take()).await {
                    Ok(new_state) => {
                        for reply in agent_replies(&new_state, seen) {
                            println!("{reply}");
                            println!();
                        }
                        state = Some(new_state);
                    }
                    Err(e) => {
                        eprintln!("error: {e}");
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Ctrl+D or 'exit' to quit)");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {e}");
                break;
            }
        }
    }

    eprintln!("Goodbye!");
    Ok(())
}

/// The agent-authored messages appended from index `from` onward.
pub fn agent_replies(state: &ConversationState, from: usize) -> impl Iterator<Item = &str> {
    state
        .messages
        .iter()
        .skip(from)
        .filter(|m| m.role == Role::Agent)
        .map(|m| m.content.as_str())
}
