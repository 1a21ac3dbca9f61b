//! Shared test helpers: a scripted [`AgentClient`] and small graph fixtures.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::Notify;

use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::graph::{AgentSettings, Graph, Node};
use nodeflow_core::traits::{AgentClient, InvocationConfig};

/// One call observed by [`MockAgentClient`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub config: InvocationConfig,
}

type Fallback = Box<dyn Fn(&str, &InvocationConfig) -> Result<String> + Send + Sync>;

/// Agent client with scripted answers keyed by prompt.
///
/// Unscripted prompts go to the fallback, which echoes the prompt by default.
pub struct MockAgentClient {
    scripted: Mutex<HashMap<String, std::result::Result<String, String>>>,
    fallback: Fallback,
    calls: Mutex<Vec<RecordedCall>>,
    gate: Option<Arc<Notify>>,
}

impl Default for MockAgentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAgentClient {
    pub fn new() -> Self {
        Self {
            scripted: Mutex::new(HashMap::new()),
            fallback: Box::new(|prompt, _| Ok(prompt.to_string())),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Answer `prompt` with `text`.
    pub fn respond(self, prompt: impl Into<String>, text: impl Into<String>) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .insert(prompt.into(), Ok(text.into()));
        self
    }

    /// Fail `prompt` with an invocation error carrying `message`.
    pub fn fail(self, prompt: impl Into<String>, message: impl Into<String>) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .insert(prompt.into(), Err(message.into()));
        self
    }

    /// Replace the echo behavior for unscripted prompts.
    pub fn with_fallback<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &InvocationConfig) -> Result<String> + Send + Sync + 'static,
    {
        self.fallback = Box::new(f);
        self
    }

    /// Each call waits for one notification on `gate` before answering.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Prompts in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.prompt).collect()
    }

    /// Calls made in grounded search mode.
    pub fn search_calls(&self) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.config.use_search)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl AgentClient for MockAgentClient {
    fn invoke(&self, prompt: &str, config: &InvocationConfig) -> BoxFuture<'_, Result<String>> {
        let prompt = prompt.to_string();
        let config = config.clone();
        Box::pin(async move {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.calls.lock().unwrap().push(RecordedCall {
                prompt: prompt.clone(),
                config: config.clone(),
            });
            let scripted = self.scripted.lock().unwrap().get(&prompt).cloned();
            match scripted {
                Some(Ok(text)) => Ok(text),
                Some(Err(message)) => Err(NodeflowError::Invocation(message)),
                None => (self.fallback)(&prompt, &config),
            }
        })
    }
}

/// Graph fixtures with stable, readable node ids.
pub mod fixtures {
    use super::*;

    /// `trigger -> agent -> output`.
    pub fn linear(prompt: &str) -> Graph {
        let mut graph = Graph::new();
        let t = add(&mut graph, Node::trigger(prompt).with_id("trigger"));
        let a = add(&mut graph, Node::agent(AgentSettings::default()).with_id("agent"));
        let o = add(&mut graph, Node::output().with_id("output"));
        link(&mut graph, &t, &a);
        link(&mut graph, &a, &o);
        graph
    }

    /// `trigger -> left`, `trigger -> right`, each agent feeding its own output.
    pub fn fan_out(prompt: &str) -> Graph {
        let mut graph = Graph::new();
        let t = add(&mut graph, Node::trigger(prompt).with_id("trigger"));
        let left = add(&mut graph, Node::agent(AgentSettings::default()).with_id("left"));
        let right = add(&mut graph, Node::agent(AgentSettings::default()).with_id("right"));
        let left_out = add(&mut graph, Node::output().with_id("left-out"));
        let right_out = add(&mut graph, Node::output().with_id("right-out"));
        link(&mut graph, &t, &left);
        link(&mut graph, &t, &right);
        link(&mut graph, &left, &left_out);
        link(&mut graph, &right, &right_out);
        graph
    }

    /// `a <-> b` where `a` is the trigger.
    pub fn two_cycle(prompt: &str) -> Graph {
        let mut graph = Graph::new();
        let a = add(&mut graph, Node::trigger(prompt).with_id("a"));
        let b = add(&mut graph, Node::agent(AgentSettings::default()).with_id("b"));
        link(&mut graph, &a, &b);
        link(&mut graph, &b, &a);
        graph
    }

    fn add(graph: &mut Graph, node: Node) -> nodeflow_core::NodeId {
        graph.add_node(node).expect("fixture node ids are unique")
    }

    fn link(graph: &mut Graph, source: &nodeflow_core::NodeId, target: &nodeflow_core::NodeId) {
        graph.connect(source, target).expect("fixture edges are valid");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_and_fallback_answers() {
        let client = MockAgentClient::new()
            .respond("hello", "world")
            .fail("boom", "quota exceeded");

        let config = InvocationConfig::new("m");
        assert_eq!(client.invoke("hello", &config).await.unwrap(), "world");
        assert_eq!(client.invoke("echo me", &config).await.unwrap(), "echo me");
        let err = client.invoke("boom", &config).await.unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded");
        assert_eq!(client.prompts(), vec!["hello", "echo me", "boom"]);
    }

    #[tokio::test]
    async fn search_is_recorded() {
        let client = MockAgentClient::new();
        client.search("rust").await.unwrap();
        assert_eq!(client.search_calls().len(), 1);
    }

    #[test]
    fn fixtures_are_valid() {
        fixtures::linear("p").validate().unwrap();
        fixtures::fan_out("p").validate().unwrap();
        fixtures::two_cycle("p").validate().unwrap();
    }
}
