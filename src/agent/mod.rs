//! Agent graph - the query/validate/execute/answer control loop
//!
//! START → first_tool_call → list_tables_tool → model_get_schema →
//! get_schema_tool → query_gen → {correct_query → execute_query →
//! process_query_result → query_gen | generate_answer → END | END}
//!
//! Two counters bound a run: `should_continue` ends the run once the
//! conversation outgrows `max_messages`, and the loop refuses to execute
//! more than `recursion_limit` nodes.

mod nodes;

use crate::chains::{AnswerSynthesizer, QueryChecker, QueryGenerator};
use crate::classifier::{classify, MessageKind};
use crate::config::AgentConfig;
use crate::conversation::{Conversation, Message};
use crate::db::{self, Database};
use crate::error::AgentError;
use crate::llm::{GeminiClient, LanguageModel};
use crate::models::{AgentOutput, Answers, ANSWER_PREFIX};
use crate::state::{Checkpointer, InMemoryCheckpointer, RunState};
use crate::tools::{create_sql_toolkit, ToolNode, LIST_TABLES_TOOL, QUERY_TOOL, SCHEMA_TOOL};
use crate::Result;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Answer returned when a run ends without any message to report
pub const NO_MESSAGE_ANSWER: &str = "응답을 처리하는 중 오류가 발생했습니다.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    FirstToolCall,
    ListTablesTool,
    ModelGetSchema,
    GetSchemaTool,
    QueryGen,
    CorrectQuery,
    ExecuteQuery,
    ProcessQueryResult,
    GenerateAnswer,
}

impl Node {
    pub fn name(self) -> &'static str {
        match self {
            Node::FirstToolCall => "first_tool_call",
            Node::ListTablesTool => "list_tables_tool",
            Node::ModelGetSchema => "model_get_schema",
            Node::GetSchemaTool => "get_schema_tool",
            Node::QueryGen => "query_gen",
            Node::CorrectQuery => "correct_query",
            Node::ExecuteQuery => "execute_query",
            Node::ProcessQueryResult => "process_query_result",
            Node::GenerateAnswer => "generate_answer",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the loop goes after `query_gen`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    CorrectQuery,
    QueryGen,
    GenerateAnswer,
    End,
}

/// Routing decision after `query_gen`, in strict precedence order.
///
/// The message-count valve is only consulted for output none of the
/// content rules recognise.
pub fn should_continue(conversation: &Conversation, max_messages: usize) -> Route {
    let kind = conversation
        .last()
        .map(classify)
        .unwrap_or(MessageKind::Unclassified);

    match kind {
        MessageKind::SqlCandidate => Route::CorrectQuery,
        MessageKind::FinalAnswer => Route::End,
        MessageKind::QuerySucceeded => Route::GenerateAnswer,
        MessageKind::ErrorText => Route::QueryGen,
        MessageKind::FreeText => Route::End,
        MessageKind::Unclassified if conversation.len() > max_messages => Route::End,
        MessageKind::Unclassified => Route::CorrectQuery,
    }
}

/// Compiled agent: the chains, tool nodes and bounds for one store and model
pub struct AgentGraph {
    model: Arc<dyn LanguageModel>,
    list_tables: ToolNode,
    get_schema: ToolNode,
    execute_query: ToolNode,
    generator: QueryGenerator,
    checker: QueryChecker,
    synthesizer: AnswerSynthesizer,
    checkpointer: Arc<dyn Checkpointer>,
    recursion_limit: usize,
    max_messages: usize,
}

impl AgentGraph {
    /// Wire the graph over `db` and `model`. The full schema is read once
    /// here and baked into the query generator.
    pub async fn new(
        model: Arc<dyn LanguageModel>,
        db: Arc<dyn Database>,
        config: &AgentConfig,
    ) -> Result<Self> {
        let table_info = db.full_table_info().await?;
        let registry = create_sql_toolkit(db.clone());

        let execute_query = registry.node(&[QUERY_TOOL])?;
        let query_tool = execute_query
            .specs()
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::ToolNotFound(QUERY_TOOL.to_string()))?;

        info!(
            model = model.name(),
            dialect = db.dialect(),
            tools = ?registry.list(),
            "Agent graph ready"
        );

        Ok(Self {
            list_tables: registry.node(&[LIST_TABLES_TOOL])?,
            get_schema: registry.node(&[SCHEMA_TOOL])?,
            execute_query,
            generator: QueryGenerator::new(model.clone(), db.dialect(), &table_info),
            checker: QueryChecker::new(model.clone(), db.dialect(), query_tool),
            synthesizer: AnswerSynthesizer::new(model.clone()),
            checkpointer: Arc::new(InMemoryCheckpointer::with_capacity(config.checkpoint_capacity)),
            recursion_limit: config.recursion_limit,
            max_messages: config.max_messages,
            model,
        })
    }

    /// Connect to the configured store and Gemini model.
    pub async fn from_config(config: &AgentConfig) -> Result<Self> {
        if config.gemini_api_key.trim().is_empty() {
            return Err(AgentError::Config("GEMINI_API_KEY is not set".to_string()));
        }

        let model = GeminiClient::new(config.gemini_api_key.clone(), config.gemini_model.clone())?;
        let db = db::connect(&config.database_url).await?;
        Self::new(Arc::new(model), db, config).await
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = checkpointer;
        self
    }

    pub fn checkpointer(&self) -> Arc<dyn Checkpointer> {
        self.checkpointer.clone()
    }

    /// Answer `question`. Never fails: every error becomes `{"error": ...}`.
    pub async fn run_agent(&self, question: &str) -> AgentOutput {
        self.run_agent_in_thread(question, Uuid::new_v4()).await
    }

    /// `run_agent` checkpointed under a caller-chosen thread id. A later run
    /// on the same thread replaces the earlier checkpoint.
    pub async fn run_agent_in_thread(&self, question: &str, thread_id: Uuid) -> AgentOutput {
        match self.invoke(question, thread_id).await {
            Ok(state) => final_output(&state),
            Err(e) => {
                error!(run_id = %thread_id, error = %e, "Agent run failed");
                AgentOutput::Error {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Drive the graph from START to END for one question.
    pub async fn invoke(&self, question: &str, thread_id: Uuid) -> Result<RunState> {
        let start_time = Instant::now();
        let mut state = RunState::new(thread_id, question);
        let mut next = Some(Node::FirstToolCall);

        info!(run_id = %thread_id, question, "Agent run started");

        while let Some(node) = next {
            if state.steps >= self.recursion_limit {
                self.checkpointer.save(&state).await?;
                return Err(AgentError::RecursionLimit(self.recursion_limit));
            }

            debug!(run_id = %thread_id, node = %node, step = state.steps + 1, "Running node");

            let appended = match self.run_node(node, &state).await {
                Ok(messages) => messages,
                Err(e) => {
                    error!(run_id = %thread_id, node = %node, error = %e, "Node failed");
                    self.checkpointer.save(&state).await?;
                    return Err(e);
                }
            };

            state = state.advance(appended);
            next = self.successor(node, &state);
        }

        info!(
            run_id = %thread_id,
            steps = state.steps,
            messages = state.conversation.len(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Agent run finished"
        );

        self.checkpointer.save(&state).await?;
        Ok(state)
    }

    async fn run_node(&self, node: Node, state: &RunState) -> Result<Vec<Message>> {
        match node {
            Node::FirstToolCall => Ok(self.first_tool_call()),
            Node::ListTablesTool => self.list_tables_tool(state).await,
            Node::ModelGetSchema => self.model_get_schema(state).await,
            Node::GetSchemaTool => self.get_schema_tool(state).await,
            Node::QueryGen => Ok(self.query_gen(state).await),
            Node::CorrectQuery => self.correct_query(state).await,
            Node::ExecuteQuery => self.execute_query(state).await,
            Node::ProcessQueryResult => self.process_query_result(state),
            Node::GenerateAnswer => Ok(self.generate_answer(state).await),
        }
    }

    fn successor(&self, node: Node, state: &RunState) -> Option<Node> {
        match node {
            Node::FirstToolCall => Some(Node::ListTablesTool),
            Node::ListTablesTool => Some(Node::ModelGetSchema),
            Node::ModelGetSchema => Some(Node::GetSchemaTool),
            Node::GetSchemaTool => Some(Node::QueryGen),
            Node::QueryGen => {
                let route = should_continue(&state.conversation, self.max_messages);
                info!(run_id = %state.thread_id, step = state.steps, route = ?route, "Routed after query_gen");
                match route {
                    Route::CorrectQuery => Some(Node::CorrectQuery),
                    Route::QueryGen => Some(Node::QueryGen),
                    Route::GenerateAnswer => Some(Node::GenerateAnswer),
                    Route::End => None,
                }
            }
            Node::CorrectQuery => Some(Node::ExecuteQuery),
            Node::ExecuteQuery => Some(Node::ProcessQueryResult),
            Node::ProcessQueryResult => Some(Node::QueryGen),
            Node::GenerateAnswer => None,
        }
    }
}

/// Caller-facing payload from the final state
fn final_output(state: &RunState) -> AgentOutput {
    let Some(last) = state.last_message() else {
        return Answers::text_only(NO_MESSAGE_ANSWER).into();
    };

    if let Some(result) = &last.result_data {
        return Answers::clone(result).into();
    }

    let answer = match last.content.strip_prefix(ANSWER_PREFIX) {
        Some(rest) => rest.trim().to_string(),
        None => last.content.clone(),
    };
    Answers::text_only(answer).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::seeded_memory_store;
    use crate::llm::{ModelResponse, ScriptedModel, ScriptedReply};
    use crate::models::{ERROR_PREFIX, QUERY_SUCCESS_SENTINEL};
    use crate::tools::EMPTY_RESULT_ERROR;
    use serde_json::json;

    const NONHYEON_SQL: &str = "SELECT r.id AS restaurant_id, r.name AS restaurant_name, r.address, \
        r.station_name, r.lat, r.lng, r.review, m.id AS menu_id, m.menu_name AS menu_name \
        FROM restaurants r LEFT JOIN menus m ON r.id = m.restaurant_id \
        WHERE r.station_name LIKE '%논현역%' or r.address LIKE '%논현동%'";

    const NONHYEON_ANSWER: &str = r#"{
        "answer": "논현역 근처의 논현동 맛집을 추천합니다.",
        "infos": [
            {"name": "논현동 맛집", "address": "서울 강남구 논현동 1", "subway": "논현역",
             "lat": "37.514352", "lng": "127.014352", "menu": "피자", "review": "맛집 후기"},
            {"name": "논현동 맛집", "address": "서울 강남구 논현동 1", "subway": "논현역",
             "lat": "37.514352", "lng": "127.014352", "menu": "스테이크", "review": "맛집 후기"}
        ]
    }"#;

    fn respond(response: ModelResponse) -> ScriptedReply {
        ScriptedReply::Respond(response)
    }

    fn schema_call() -> ScriptedReply {
        respond(ModelResponse::tool_call(
            SCHEMA_TOOL,
            json!({"table_names": "restaurants, menus"}),
        ))
    }

    fn query_call(sql: &str) -> ScriptedReply {
        respond(ModelResponse::tool_call(QUERY_TOOL, json!({ "query": sql })))
    }

    async fn graph_with(
        replies: Vec<ScriptedReply>,
        recursion_limit: usize,
    ) -> (AgentGraph, Arc<ScriptedModel>) {
        let model = Arc::new(ScriptedModel::new(replies));
        let config = AgentConfig {
            recursion_limit,
            ..AgentConfig::default()
        };
        let graph = AgentGraph::new(model.clone(), Arc::new(seeded_memory_store().await), &config)
            .await
            .unwrap();
        (graph, model)
    }

    fn conversation_ending_with(content: &str) -> Conversation {
        Conversation::from_question("q").with(vec![Message::assistant(content)])
    }

    #[test]
    fn test_should_continue_precedence() {
        let route = |content: &str| should_continue(&conversation_ending_with(content), 20);

        assert_eq!(route("Answer: SELECT r.name FROM restaurants r"), Route::CorrectQuery);
        assert_eq!(route("Answer: ```sql\nSELECT 1\n```"), Route::CorrectQuery);
        assert_eq!(route("```sql\nSELECT 1\n```"), Route::CorrectQuery);
        assert_eq!(route("Answer: 논현역 근처 맛집은 논현동 맛집입니다."), Route::End);
        assert_eq!(route(QUERY_SUCCESS_SENTINEL), Route::GenerateAnswer);
        assert_eq!(route(EMPTY_RESULT_ERROR), Route::QueryGen);
        assert_eq!(route("I could not find any restaurant."), Route::End);
        assert_eq!(route("SELECT r.name FROM restaurants r WHERE 1"), Route::CorrectQuery);
        assert_eq!(route("SELECT 1"), Route::CorrectQuery);
    }

    #[test]
    fn test_errors_always_route_to_query_gen() {
        for error in [
            EMPTY_RESULT_ERROR.to_string(),
            format!("{} no such table: pets", ERROR_PREFIX),
            format!("{} 쿼리 생성 중 오류가 발생했습니다: timeout", ERROR_PREFIX),
        ] {
            let mut conversation = conversation_ending_with(&error);
            for _ in 0..25 {
                assert_eq!(should_continue(&conversation, 20), Route::QueryGen);
                conversation = conversation.with(vec![Message::assistant(error.clone())]);
            }
        }
    }

    #[test]
    fn test_message_ceiling_forces_end() {
        let mut conversation = Conversation::from_question("q");
        for _ in 0..19 {
            conversation = conversation.with(vec![Message::assistant("short")]);
        }
        assert_eq!(conversation.len(), 20);
        assert_eq!(should_continue(&conversation, 20), Route::CorrectQuery);

        let conversation = conversation.with(vec![Message::assistant("short")]);
        assert_eq!(should_continue(&conversation, 20), Route::End);
    }

    #[tokio::test]
    async fn test_nonhyeon_scenario_merges_menus() {
        let (graph, model) = graph_with(
            vec![
                schema_call(),
                respond(ModelResponse::text(format!("Answer: {}", NONHYEON_SQL))),
                query_call(NONHYEON_SQL),
                respond(ModelResponse::text(NONHYEON_ANSWER)),
            ],
            10,
        )
        .await;

        let output = graph.run_agent("논현역 맛집 추천해줘").await;

        let AgentOutput::Answer { answer, infos } = output else {
            panic!("expected an answer, got {:?}", output);
        };
        assert_eq!(answer, "논현역 근처의 논현동 맛집을 추천합니다.");
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].menu, "피자, 스테이크");
        assert_eq!(infos[0].coordinates(), Some((37.514352, 127.014352)));
        assert_eq!(model.remaining().await, 0);

        // the validator received the bare statement, not the Answer: form
        let requests = model.requests().await;
        assert_eq!(requests[2].messages[0].content, NONHYEON_SQL);
        assert!(requests[3].messages[0].content.contains("논현동 맛집"));
    }

    #[tokio::test]
    async fn test_happy_path_fits_recursion_limit() {
        let (graph, _model) = graph_with(
            vec![
                schema_call(),
                respond(ModelResponse::text(format!("Answer: {}", NONHYEON_SQL))),
                query_call(NONHYEON_SQL),
                respond(ModelResponse::text(NONHYEON_ANSWER)),
            ],
            10,
        )
        .await;

        let thread_id = Uuid::new_v4();
        let state = graph.invoke("논현역 맛집 추천해줘", thread_id).await.unwrap();
        assert_eq!(state.steps, 10);

        let saved = graph.checkpointer().load(thread_id).await.unwrap().unwrap();
        assert_eq!(saved.conversation.len(), state.conversation.len());
    }

    #[tokio::test]
    async fn test_recovers_after_execution_error() {
        let (graph, model) = graph_with(
            vec![
                schema_call(),
                respond(ModelResponse::text("Answer: SELECT p.name FROM pets p")),
                query_call("SELECT p.name FROM pets p"),
                respond(ModelResponse::text(
                    "Answer: SELECT r.name AS restaurant_name FROM restaurants r WHERE r.name LIKE '%을지%'",
                )),
                query_call("SELECT r.name AS restaurant_name FROM restaurants r WHERE r.name LIKE '%을지%'"),
                respond(ModelResponse::text(
                    r#"{"answer": "을지면옥을 추천합니다.", "infos": [{"name": "을지면옥", "lat": null}]}"#,
                )),
            ],
            20,
        )
        .await;

        let output = graph.run_agent("을지로 냉면집 알려줘").await;
        let AgentOutput::Answer { infos, .. } = output else {
            panic!("expected an answer, got {:?}", output);
        };
        assert_eq!(infos[0].name, "을지면옥");
        assert_eq!(infos[0].coordinates(), None);

        // the regeneration saw the execution error
        let requests = model.requests().await;
        let regeneration = &requests[3];
        assert!(regeneration
            .messages
            .last()
            .unwrap()
            .content
            .starts_with(ERROR_PREFIX));
    }

    #[tokio::test]
    async fn test_endless_errors_hit_recursion_limit() {
        let (graph, _model) = graph_with(
            vec![
                schema_call(),
                respond(ModelResponse::text("Answer: SELECT p.name FROM pets p")),
                query_call("SELECT p.name FROM pets p"),
            ],
            10,
        )
        .await;

        let output = graph.run_agent("강아지 카페 알려줘").await;
        assert_eq!(
            output,
            AgentOutput::Error {
                error: "Recursion limit of 10 reached without hitting a stop condition".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_checkpoints_bounded_across_runs() {
        let prose = "죄송하지만 질문하신 지역에 대한 정보를 데이터베이스에서 찾을 수 없었습니다.";
        let replies = (0..3)
            .flat_map(|_| [schema_call(), respond(ModelResponse::text(prose))])
            .collect();
        let model = Arc::new(ScriptedModel::new(replies));
        let config = AgentConfig {
            checkpoint_capacity: 2,
            ..AgentConfig::default()
        };
        let graph = AgentGraph::new(model, Arc::new(seeded_memory_store().await), &config)
            .await
            .unwrap();

        let threads: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for thread_id in &threads {
            graph.invoke("화성 맛집", *thread_id).await.unwrap();
        }

        let checkpoints = graph.checkpointer();
        assert!(checkpoints.load(threads[0]).await.unwrap().is_none());
        assert!(checkpoints.load(threads[1]).await.unwrap().is_some());
        assert!(checkpoints.load(threads[2]).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_free_text_ends_without_execution() {
        let prose = "죄송하지만 질문하신 지역에 대한 정보를 데이터베이스에서 찾을 수 없었습니다. 다른 지역을 말씀해 주시면 다시 찾아보겠습니다.";
        let (graph, model) = graph_with(
            vec![schema_call(), respond(ModelResponse::text(prose))],
            10,
        )
        .await;

        let output = graph.run_agent("화성 맛집").await;
        assert_eq!(output, AgentOutput::from(Answers::text_only(prose)));
        assert_eq!(model.requests().await.len(), 2);

        let (graph, model) = graph_with(
            vec![schema_call(), respond(ModelResponse::text("I could not find any restaurant."))],
            10,
        )
        .await;
        let output = graph.run_agent("mars").await;
        assert_eq!(output, AgentOutput::from(Answers::text_only("I could not find any restaurant.")));
        assert_eq!(model.remaining().await, 0);
    }

    #[tokio::test]
    async fn test_schema_model_failure_is_reported() {
        let (graph, _model) =
            graph_with(vec![ScriptedReply::Fail("quota exceeded".to_string())], 10).await;

        let output = graph.run_agent("논현역 맛집 추천해줘").await;
        assert_eq!(
            output,
            AgentOutput::Error {
                error: "LLM error: quota exceeded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_query_gen_failure_becomes_error_message() {
        let (graph, _model) =
            graph_with(vec![ScriptedReply::Fail("timeout".to_string())], 10).await;

        let state = RunState::new(Uuid::new_v4(), "q");
        let messages = graph.query_gen(&state).await;
        assert_eq!(
            messages[0].content,
            "Error: 쿼리 생성 중 오류가 발생했습니다: LLM error: timeout"
        );
    }

    #[tokio::test]
    async fn test_query_gen_long_reply_gets_answer_prefix() {
        let prose = "논현역 근처에는 여러 맛집이 있으며 그 중에서도 피자와 스테이크가 유명한 논현동 맛집을 추천드립니다. 꼭 가보세요!";
        let (graph, _model) =
            graph_with(vec![respond(ModelResponse::text(prose))], 10).await;

        let messages = graph.query_gen(&RunState::new(Uuid::new_v4(), "q")).await;
        assert_eq!(messages[0].content, format!("Answer: {}", prose));
    }

    #[tokio::test]
    async fn test_query_gen_short_circuits_on_existing_result() {
        let (graph, model) = graph_with(vec![], 10).await;
        let state = RunState::new(Uuid::new_v4(), "q").advance(vec![
            Message::tool("restaurant_name\n('논현동 맛집',)", "c1", Some(QUERY_TOOL.to_string())),
            Message::assistant(QUERY_SUCCESS_SENTINEL),
        ]);

        let messages = graph.query_gen(&state).await;
        assert_eq!(messages[0].content, QUERY_SUCCESS_SENTINEL);
        assert!(model.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_process_query_result_shapes() {
        let (graph, _model) = graph_with(vec![], 10).await;
        let base = RunState::new(Uuid::new_v4(), "q");

        let ok = base.advance(vec![Message::tool(
            "restaurant_name\n('논현동 맛집',)",
            "c1",
            Some(QUERY_TOOL.to_string()),
        )]);
        let out = graph.process_query_result(&ok).unwrap();
        assert_eq!(out[0].content, QUERY_SUCCESS_SENTINEL);

        let failed = base.advance(vec![Message::tool(
            EMPTY_RESULT_ERROR,
            "c2",
            Some(QUERY_TOOL.to_string()),
        )]);
        let out = graph.process_query_result(&failed).unwrap();
        assert_eq!(out[0].content, EMPTY_RESULT_ERROR);
        assert_eq!(
            should_continue(&failed.advance(out).conversation, 20),
            Route::QueryGen
        );

        let odd = base.advance(vec![Message::tool("Here is the error: x", "c3", None)]);
        let out = graph.process_query_result(&odd).unwrap();
        assert_eq!(out[0].content, "Here is the error: x");
    }

    fn answered_state() -> RunState {
        RunState::new(Uuid::new_v4(), "논현역 맛집 추천해줘").advance(vec![
            Message::tool(
                "restaurant_id, restaurant_name, menu_name\n(1, '논현동 맛집', '피자')\n(1, '논현동 맛집', '스테이크')",
                "c1",
                Some(QUERY_TOOL.to_string()),
            ),
            Message::assistant(QUERY_SUCCESS_SENTINEL),
        ])
    }

    #[tokio::test]
    async fn test_generate_answer_reply_shapes() {
        let (graph, _model) = graph_with(
            vec![
                respond(ModelResponse::text(NONHYEON_ANSWER)),
                respond(ModelResponse::text("{\"answer\": \"논현동 맛집\", \"infos\": \"none\"}")),
                respond(ModelResponse::text("논현동 맛집을 추천합니다")),
                respond(ModelResponse::text("null")),
                ScriptedReply::Fail("boom".to_string()),
            ],
            10,
        )
        .await;
        let state = answered_state();

        let structured = &graph.generate_answer(&state).await[0];
        let data = structured.result_data.as_ref().unwrap();
        assert_eq!(data.infos.len(), 1);
        assert_eq!(structured.content, "Answer: 논현역 근처의 논현동 맛집을 추천합니다.");

        let map = &graph.generate_answer(&state).await[0];
        assert_eq!(map.content, "Answer: 논현동 맛집");
        assert!(map.result_data.as_ref().unwrap().infos.is_empty());

        let plain = &graph.generate_answer(&state).await[0];
        assert_eq!(plain.content, "Answer: 논현동 맛집을 추천합니다");
        assert!(plain.result_data.is_none());

        let other = &graph.generate_answer(&state).await[0];
        assert_eq!(other.content, "Answer: 응답을 생성할 수 없습니다.");

        let failed = &graph.generate_answer(&state).await[0];
        assert_eq!(
            failed.content,
            "Answer: 죄송합니다, 쿼리 결과를 해석하는 중 오류가 발생했습니다: LLM error: boom"
        );
    }

    #[tokio::test]
    async fn test_generate_answer_without_result() {
        let (graph, model) = graph_with(vec![], 10).await;
        let state = RunState::new(Uuid::new_v4(), "q").advance(vec![Message::tool(
            EMPTY_RESULT_ERROR,
            "c1",
            Some(QUERY_TOOL.to_string()),
        )]);

        let messages = graph.generate_answer(&state).await;
        assert_eq!(messages[0].content, nodes::NO_RESULT_ANSWER);
        assert!(model.requests().await.is_empty());
    }

    #[test]
    fn test_final_output_strips_prefix_once() {
        let state = RunState::new(Uuid::new_v4(), "q")
            .advance(vec![Message::assistant("Answer:  Answer: 그대로")]);
        assert_eq!(final_output(&state), AgentOutput::from(Answers::text_only("Answer: 그대로")));

        let plain = RunState::new(Uuid::new_v4(), "q").advance(vec![Message::assistant("그냥")]);
        assert_eq!(final_output(&plain), AgentOutput::from(Answers::text_only("그냥")));
    }
}
