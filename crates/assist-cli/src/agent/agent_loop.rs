//! Turn loop implementation

use std::io::Write;

use anyhow::Result;
use assist_core::{
    AgentError, CompletionRequest, CompletionService, RemoteErrorKind, Role, ToolCall,
    ToolExchange,
};
use tracing::{debug, info, instrument, warn};

use crate::repl::{LineSource, ReadOutcome, CYAN, DIM, GREEN, RESET, YELLOW};
use crate::tools::registry::ToolRegistry;

use super::state::{AgentConfig, AgentContext, Input, LoopState, LoopStats};

const USER_PROMPT: &str = "You: ";

/// Reads console lines, records turns, consults the completion service and
/// runs the tools it asks for, until an exit keyword or end of input.
pub struct TurnLoop {
    service: Box<dyn CompletionService>,
    registry: ToolRegistry,
    config: AgentConfig,
    context: AgentContext,
    system: String,
    stats: LoopStats,
}

impl TurnLoop {
    pub fn new(
        service: Box<dyn CompletionService>,
        registry: ToolRegistry,
        config: AgentConfig,
        context: AgentContext,
    ) -> Self {
        let system = build_system_prompt(&config.system_prompt, &registry);

        Self {
            service,
            registry,
            config,
            context,
            system,
            stats: LoopStats::default(),
        }
    }

    pub fn context(&self) -> &AgentContext {
        &self.context
    }

    /// Drive the state machine until it stops
    #[instrument(skip_all, fields(session = %self.context.session_id(), provider = %self.service.name()))]
    pub async fn run<S: LineSource, W: Write>(&mut self, input: &mut S, out: &mut W) -> Result<LoopStats> {
        info!(
            turns = self.context.transcript().len(),
            tools = self.registry.len(),
            "Starting turn loop"
        );

        let mut state = LoopState::AwaitingInput;
        while state != LoopState::Stopped {
            state = self.step(state, input, out).await?;
        }

        writeln!(out, "{}Goodbye!{}", DIM, RESET)?;
        out.flush()?;

        info!(
            completed = self.stats.completed,
            failed = self.stats.failed,
            tool_calls = self.stats.tool_calls,
            "Turn loop stopped"
        );
        Ok(self.stats)
    }

    /// Perform one transition. Errors returned here are console I/O
    /// failures; turn failures are reported and the loop returns to input.
    async fn step<S: LineSource, W: Write>(
        &mut self,
        state: LoopState,
        input: &mut S,
        out: &mut W,
    ) -> Result<LoopState> {
        let next = match state {
            LoopState::AwaitingInput => self.await_input(input, out)?,

            LoopState::Dispatching { exchanges, pending } => match pending {
                None => LoopState::AwaitingCompletion { exchanges },
                Some(call) => {
                    let mut exchanges = exchanges;
                    let output = self.dispatch(&call, out)?;
                    exchanges.push(ToolExchange { call, output });
                    LoopState::AwaitingCompletion { exchanges }
                }
            },

            LoopState::AwaitingCompletion { exchanges } => {
                match self.complete(exchanges).await {
                    Ok(next) => next,
                    Err(e) => {
                        self.report_failure(&e, out)?;
                        LoopState::AwaitingInput
                    }
                }
            }

            LoopState::Printing { reply } => {
                match self.context.record(Role::Agent, reply.as_str()) {
                    Ok(_) => {
                        writeln!(out, "{}Agent:{} {}", GREEN, RESET, reply)?;
                        self.stats.completed += 1;
                    }
                    Err(e) => self.report_failure(&e, out)?,
                }
                LoopState::AwaitingInput
            }

            LoopState::Stopped => LoopState::Stopped,
        };

        out.flush()?;
        Ok(next)
    }

    fn await_input<S: LineSource, W: Write>(&mut self, input: &mut S, out: &mut W) -> Result<LoopState> {
        let line = match input.read_line(USER_PROMPT) {
            Ok(ReadOutcome::Line(line)) => line,
            Ok(ReadOutcome::Interrupted) => {
                writeln!(out, "{}^C{}", DIM, RESET)?;
                return Ok(LoopState::AwaitingInput);
            }
            Ok(ReadOutcome::Eof) => return Ok(LoopState::Stopped),
            Err(e) => {
                warn!(error = %e, "Failed to read input");
                writeln!(out, "{}Error:{} {}", YELLOW, RESET, e)?;
                return Ok(LoopState::Stopped);
            }
        };

        match Input::classify(&line) {
            Input::Exit => Ok(LoopState::Stopped),
            Input::Blank => Ok(LoopState::AwaitingInput),
            Input::Message(text) => match self.context.record(Role::User, text) {
                Ok(_) => Ok(LoopState::Dispatching {
                    exchanges: Vec::new(),
                    pending: None,
                }),
                Err(e) => {
                    self.report_failure(&e, out)?;
                    Ok(LoopState::AwaitingInput)
                }
            },
        }
    }

    /// Run a requested tool. Faults become the tool's result text so the
    /// service can react to them.
    fn dispatch<W: Write>(&mut self, call: &ToolCall, out: &mut W) -> Result<String> {
        debug!(tool = %call.name, "Dispatching tool call");
        self.stats.tool_calls += 1;

        let result = self.registry.invoke(&call.name, &call.input);

        if self.config.verbose {
            let status = if result.is_ok() {
                format!("{}OK{}", GREEN, RESET)
            } else {
                format!("{}Failed{}", YELLOW, RESET)
            };
            writeln!(out, "{}[Tool: {}]{} {}", CYAN, call.name, RESET, status)?;
        }

        Ok(match result {
            Ok(output) => output,
            Err(e) => format!("Tool error: {}", e),
        })
    }

    async fn complete(&self, exchanges: Vec<ToolExchange>) -> Result<LoopState, AgentError> {
        let request = CompletionRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            system: self.system.clone(),
            tools: self.registry.descriptors(),
            transcript: self.context.transcript().to_vec(),
            exchanges,
        };

        debug!(
            turns = request.transcript.len(),
            exchanges = request.exchanges.len(),
            "Calling completion service"
        );
        let response = self.service.complete(&request).await?;

        match response.tool_call {
            Some(call) => {
                if request.exchanges.len() >= self.config.max_tool_rounds {
                    return Err(AgentError::remote(
                        RemoteErrorKind::ToolLoop,
                        format!(
                            "service requested more than {} tool calls in one turn",
                            self.config.max_tool_rounds
                        ),
                    ));
                }
                Ok(LoopState::Dispatching {
                    exchanges: request.exchanges,
                    pending: Some(call),
                })
            }
            None => Ok(LoopState::Printing { reply: response.text }),
        }
    }

    fn report_failure<W: Write>(&mut self, error: &AgentError, out: &mut W) -> Result<()> {
        warn!(error = %error, "Turn failed");
        self.stats.failed += 1;
        writeln!(out, "{}Error:{} {}", YELLOW, RESET, error)?;
        writeln!(out, "Please try again.")?;
        Ok(())
    }
}

fn build_system_prompt(base: &str, registry: &ToolRegistry) -> String {
    let mut prompt = String::from(base.trim_end());

    if !registry.is_empty() {
        prompt.push_str("\n\n## Available Tools\n");
        prompt.push_str(&registry.describe());
    }

    prompt
}
