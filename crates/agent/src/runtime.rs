use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use threadline_core::config::AgentConfig;
use threadline_core::domain::chat::ChatTurn;

use crate::llm::{ChatModel, FunctionDeclaration, LlmError};
use crate::session::{ChatSession, SessionStore};
use crate::tools::{ToolContext, ToolKind, Toolbox};

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are the WhatsApp sales assistant of a wholesale \
garment supplier. Answer in the customer's language, briefly and politely. Use \
get_product_inventory for stock questions, search_product_information for questions about \
materials, care, shipping or terms, and place_b2b_order only after the customer has confirmed \
the product ID and quantity. Never invent prices, stock levels or order confirmations: repeat \
what the tools return. Orders start at 50 units and unit prices drop at 100 and 200 units.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model produced a plain-text reply for the customer.
    Answered(String),
    /// The model kept calling tools past the configured bound.
    NotConverged { iterations: u32 },
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model call failed: {0}")]
    Model(#[from] LlmError),
    #[error("model requested unknown tool `{name}`")]
    UnknownTool { name: String },
}

pub struct AgentRuntime {
    model: Arc<dyn ChatModel>,
    toolbox: Toolbox,
    sessions: Arc<SessionStore>,
    declarations: Vec<FunctionDeclaration>,
    system_instruction: String,
    max_tool_iterations: u32,
}

impl AgentRuntime {
    pub fn new(
        model: Arc<dyn ChatModel>,
        toolbox: Toolbox,
        sessions: Arc<SessionStore>,
        config: &AgentConfig,
    ) -> Self {
        Self {
            model,
            toolbox,
            sessions,
            declarations: ToolKind::declarations(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            max_tool_iterations: config.max_tool_iterations.max(1),
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Runs one customer turn to completion. Unless the model answers, the
    /// session is rolled back to where it was before the message arrived.
    pub async fn handle_message(
        &self,
        sender: &str,
        text: &str,
    ) -> Result<TurnOutcome, AgentError> {
        let mut session = self.sessions.acquire(sender).await;
        let checkpoint = session.history().len();

        let result = self.run_turn(&mut session, text).await;
        if !matches!(result, Ok(TurnOutcome::Answered(_))) {
            session.truncate(checkpoint);
        }
        session.touch();
        result
    }

    async fn run_turn(
        &self,
        session: &mut ChatSession,
        text: &str,
    ) -> Result<TurnOutcome, AgentError> {
        let context = ToolContext { customer_id: session.sender().to_string() };
        session.push(ChatTurn::user_text(text));

        let mut round = 0;
        loop {
            let reply = self
                .model
                .generate(&self.system_instruction, session.history(), &self.declarations)
                .await?;

            let calls = reply
                .function_calls()
                .into_iter()
                .map(|call| {
                    call.name
                        .parse::<ToolKind>()
                        .map(|kind| (kind, call.clone()))
                        .map_err(|_| AgentError::UnknownTool { name: call.name.clone() })
                })
                .collect::<Result<Vec<_>, _>>()?;

            if calls.is_empty() {
                let answer = reply.into_turn();
                let text = answer.text();
                session.push(answer);
                info!(event_name = "agent.turn.answered", tool_rounds = round, "agent answered");
                return Ok(TurnOutcome::Answered(text));
            }

            if round >= self.max_tool_iterations {
                warn!(
                    event_name = "agent.turn.not_converged",
                    iterations = round,
                    "agent exceeded tool iteration bound"
                );
                return Ok(TurnOutcome::NotConverged { iterations: round });
            }
            round += 1;

            session.push(reply.into_turn());
            let mut responses = Vec::with_capacity(calls.len());
            for (kind, call) in calls {
                debug!(
                    event_name = "agent.tool.invoked",
                    tool = kind.name(),
                    args = %call.args,
                    round,
                    "executing tool call"
                );
                let result = self.toolbox.execute(kind, &call.args, &context).await;
                responses.push((call.name, json!({ "content": result })));
            }
            session.push(ChatTurn::function_responses(responses));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use serde_json::{json, Value};

    use threadline_core::config::AppConfig;
    use threadline_core::domain::chat::{ChatTurn, TurnPart};
    use threadline_core::domain::product::{Product, ProductId, TierPrices};
    use threadline_db::repositories::InMemoryCatalogRepository;

    use super::{AgentError, AgentRuntime, TurnOutcome};
    use crate::embedding::{Embedder, EmbeddingTask};
    use crate::llm::{ChatModel, FunctionDeclaration, LlmError, ModelReply};
    use crate::session::SessionStore;
    use crate::tools::{ToolSettings, Toolbox};

    /// Replays canned replies and records the history it was shown.
    #[derive(Default)]
    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<ModelReply, LlmError>>>,
        seen: Mutex<Vec<Vec<ChatTurn>>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<ModelReply, LlmError>>) -> Self {
            Self { replies: Mutex::new(replies.into()), seen: Mutex::default() }
        }

        fn seen(&self) -> Vec<Vec<ChatTurn>> {
            self.seen.lock().expect("seen lock").clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn generate(
            &self,
            _system_instruction: &str,
            history: &[ChatTurn],
            tools: &[FunctionDeclaration],
        ) -> Result<ModelReply, LlmError> {
            assert_eq!(tools.len(), 3);
            self.seen.lock().expect("seen lock").push(history.to_vec());
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(ModelReply::function_call("get_product_inventory", json!({})))
                })
        }
    }

    struct NullEmbedder;

    #[async_trait]
    impl Embedder for NullEmbedder {
        async fn embed(&self, _text: &str, _task: EmbeddingTask) -> Result<Vec<f32>, LlmError> {
            Ok(vec![0.0, 0.0])
        }
    }

    fn shirt(id: i64, size: &str) -> Product {
        Product {
            id: ProductId(id),
            garment_type: "Shirt".to_string(),
            size: size.to_string(),
            color: "White".to_string(),
            available_quantity: 300,
            available: true,
            tier_prices: TierPrices {
                per_unit_50: Some(Decimal::new(1200, 2)),
                ..TierPrices::default()
            },
        }
    }

    fn runtime(model: Arc<ScriptedModel>, repo: Arc<InMemoryCatalogRepository>) -> AgentRuntime {
        let config = AppConfig::default().agent;
        let toolbox =
            Toolbox::new(repo.clone(), repo, Arc::new(NullEmbedder), ToolSettings::from(&config));
        let sessions = Arc::new(SessionStore::new(Duration::from_secs(config.session_ttl_secs)));
        AgentRuntime::new(model, toolbox, sessions, &config)
    }

    fn function_response_content(turn: &ChatTurn) -> Option<Value> {
        turn.parts.iter().find_map(|part| match part {
            TurnPart::FunctionResponse { response, .. } => response.get("content").cloned(),
            _ => None,
        })
    }

    #[tokio::test]
    async fn size_question_runs_inventory_tool_and_relays_answer() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(ModelReply::function_call("get_product_inventory", json!({ "size": "L" }))),
            Ok(ModelReply::text("Yes! We have white shirts in L, 300 in stock.")),
        ]));
        let repo =
            Arc::new(InMemoryCatalogRepository::with_products([shirt(1, "L"), shirt(2, "M")]));
        let agent = runtime(model.clone(), repo);

        let outcome = agent
            .handle_message("+5215550001111", "do you have size L shirts")
            .await
            .expect("turn");

        assert_eq!(
            outcome,
            TurnOutcome::Answered("Yes! We have white shirts in L, 300 in stock.".to_string())
        );
        let seen = model.seen();
        assert_eq!(seen.len(), 2);
        let tool_turn = seen[1].last().expect("function response turn");
        assert_eq!(
            function_response_content(tool_turn),
            Some(json!(
                "Inventory results:\n- ID: 1, Garment: Shirt, Size: L, Color: White, Stock: 300\n"
            ))
        );
    }

    #[tokio::test]
    async fn every_call_in_a_reply_is_executed() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(ModelReply {
                parts: vec![
                    TurnPart::FunctionCall(threadline_core::FunctionCall::new(
                        "get_product_inventory",
                        json!({ "size": "L" }),
                    )),
                    TurnPart::FunctionCall(threadline_core::FunctionCall::new(
                        "get_product_inventory",
                        json!({ "size": "XS" }),
                    )),
                ],
            }),
            Ok(ModelReply::text("done")),
        ]));
        let repo = Arc::new(InMemoryCatalogRepository::with_products([shirt(1, "L")]));
        let agent = runtime(model.clone(), repo);

        agent.handle_message("+1", "sizes?").await.expect("turn");

        let responses = model.seen()[1].last().expect("responses").parts.len();
        assert_eq!(responses, 2);
    }

    #[tokio::test]
    async fn order_placed_through_the_loop_uses_sender_as_customer() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(ModelReply::function_call(
                "place_b2b_order",
                json!({ "product_id": 1, "quantity": 60 }),
            )),
            Ok(ModelReply::text("Your order is confirmed.")),
        ]));
        let repo = Arc::new(InMemoryCatalogRepository::with_products([shirt(1, "L")]));
        let agent = runtime(model, repo.clone());

        agent.handle_message("+5215550001111", "order 60 of product 1").await.expect("turn");

        let orders = repo.orders().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].customer_id, "+5215550001111");
        assert_eq!(orders[0].quantity, 60);
    }

    #[tokio::test]
    async fn runaway_tool_calls_do_not_converge() {
        let model = Arc::new(ScriptedModel::default());
        let agent = runtime(model.clone(), Arc::new(InMemoryCatalogRepository::default()));

        let outcome = agent.handle_message("+1", "loop forever").await.expect("turn");

        assert_eq!(outcome, TurnOutcome::NotConverged { iterations: 8 });
        assert_eq!(model.seen().len(), 9);
        assert_eq!(agent.sessions().acquire("+1").await.history().len(), 0);
    }

    #[tokio::test]
    async fn unknown_tools_are_a_typed_error_and_roll_back() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(ModelReply::text("Hi! How can I help?")),
            Ok(ModelReply::function_call("drop_tables", json!({}))),
        ]));
        let agent = runtime(model, Arc::new(InMemoryCatalogRepository::default()));

        agent.handle_message("+1", "hello").await.expect("first turn");
        let error = agent.handle_message("+1", "do something odd").await.expect_err("unknown tool");

        assert!(matches!(error, AgentError::UnknownTool { ref name } if name == "drop_tables"));
        assert_eq!(agent.sessions().acquire("+1").await.history().len(), 2);
    }

    #[tokio::test]
    async fn model_failures_surface_as_model_errors() {
        let model = Arc::new(ScriptedModel::new(vec![Err(LlmError::Api {
            status: 500,
            message: "boom".to_string(),
        })]));
        let agent = runtime(model, Arc::new(InMemoryCatalogRepository::default()));

        let error = agent.handle_message("+1", "hello").await.expect_err("model error");
        assert!(matches!(error, AgentError::Model(LlmError::Api { status: 500, .. })));
        assert_eq!(agent.sessions().acquire("+1").await.history().len(), 0);
    }

    #[tokio::test]
    async fn history_carries_across_turns() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(ModelReply::text("Hello!")),
            Ok(ModelReply::text("Sure.")),
        ]));
        let agent = runtime(model.clone(), Arc::new(InMemoryCatalogRepository::default()));

        agent.handle_message("+1", "hi").await.expect("turn");
        agent.handle_message("+1", "thanks").await.expect("turn");

        let second_call = &model.seen()[1];
        assert_eq!(second_call.len(), 3);
        assert_eq!(second_call[0], ChatTurn::user_text("hi"));
        assert_eq!(second_call[2], ChatTurn::user_text("thanks"));
    }
}
