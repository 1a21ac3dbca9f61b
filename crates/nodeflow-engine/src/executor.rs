use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use nodeflow_core::config::EngineConfig;
use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::event::EventBus;
use nodeflow_core::graph::{Graph, Node, NodeKind};
use nodeflow_core::traits::{AgentClient, InvocationConfig};
use nodeflow_core::types::{NodeId, RunEvent, RunId};

use crate::report::{FiringOutcome, NodeFiring, RunReport};
use crate::status::StatusBoard;

/// Executes workflow graphs breadth-first from their trigger node.
///
/// A single text payload flows along edges. Every distinct `(node, payload)`
/// pair fires at most once per run, which keeps cyclic graphs finite as long
/// as payloads repeat; `max_steps` bounds the rest.
pub struct WorkflowEngine {
    client: Arc<dyn AgentClient>,
    config: EngineConfig,
    board: Arc<StatusBoard>,
    event_bus: Arc<EventBus>,
    running: AtomicBool,
}

/// Clears the running flag on every exit path, including a dropped future.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| NodeflowError::RunInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl WorkflowEngine {
    pub fn new(client: Arc<dyn AgentClient>, config: EngineConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_capacity));
        Self {
            client,
            config,
            board: Arc::new(StatusBoard::new()),
            event_bus,
            running: AtomicBool::new(false),
        }
    }

    /// Publish run events on a shared bus instead of a private one.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn status_board(&self) -> &Arc<StatusBoard> {
        &self.board
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run `graph` to completion.
    ///
    /// Returns `RunInProgress` without touching any state if another run is
    /// active, and `NoTrigger` (after resetting every node) if the graph has
    /// no trigger. Node failures are recorded on the node and stop only
    /// that branch.
    pub async fn run(&self, graph: &Graph) -> Result<RunReport> {
        let _guard = RunGuard::acquire(&self.running)?;

        let run_id = RunId::new();
        let start = Instant::now();
        self.emit(RunEvent::RunStarted {
            run_id: run_id.clone(),
            at: Utc::now(),
        });

        self.board.clear();
        for node in graph.nodes() {
            self.emit(RunEvent::NodeReset {
                node_id: node.id.clone(),
            });
        }

        let trigger = match self.find_trigger(graph) {
            Some(trigger) => trigger,
            None => {
                let e = NodeflowError::NoTrigger;
                error!(run_id = %run_id, error = %e, "Workflow run failed");
                self.emit(RunEvent::RunFailed {
                    run_id,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let seed = match &trigger.kind {
            NodeKind::Trigger(settings) => settings.initial_prompt.clone(),
            _ => String::new(),
        };

        info!(run_id = %run_id, trigger = %trigger.id, nodes = graph.nodes().len(), "Starting workflow run");

        let mut queue: VecDeque<(NodeId, String)> = VecDeque::new();
        queue.push_back((trigger.id.clone(), seed));
        let mut processed: HashSet<(NodeId, String)> = HashSet::new();
        let mut firings = Vec::new();
        let mut truncated = false;

        while let Some((node_id, input)) = queue.pop_front() {
            if processed.contains(&(node_id.clone(), input.clone())) {
                debug!(node_id = %node_id, "Skipping already processed firing");
                continue;
            }
            if firings.len() >= self.config.max_steps {
                warn!(
                    run_id = %run_id,
                    max_steps = self.config.max_steps,
                    dropped = queue.len() + 1,
                    "Firing limit reached, dropping queued work"
                );
                truncated = true;
                break;
            }
            let Some(node) = graph.node(&node_id) else {
                warn!(node_id = %node_id, "Queued node no longer exists, skipping");
                continue;
            };
            processed.insert((node_id.clone(), input.clone()));

            let firing = self.fire(graph, node, input, &mut queue).await;
            firings.push(firing);
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            run_id = %run_id,
            firings = firings.len(),
            truncated,
            elapsed_ms,
            "Workflow run complete"
        );
        self.emit(RunEvent::RunCompleted {
            run_id: run_id.clone(),
            firings: firings.len(),
            truncated,
            elapsed_ms,
        });

        Ok(RunReport {
            run_id,
            firings,
            elapsed_ms,
            truncated,
        })
    }

    fn find_trigger<'g>(&self, graph: &'g Graph) -> Option<&'g Node> {
        let mut triggers = graph.triggers();
        let first = triggers.next()?;
        let extra = triggers.count();
        if extra > 0 {
            warn!(trigger = %first.id, ignored = extra, "Multiple trigger nodes, using the first");
        }
        Some(first)
    }

    /// Execute one node and enqueue its successors on success.
    async fn fire(
        &self,
        graph: &Graph,
        node: &Node,
        input: String,
        queue: &mut VecDeque<(NodeId, String)>,
    ) -> NodeFiring {
        debug!(node_id = %node.id, kind = node.kind.name(), "Executing node");
        self.emit(RunEvent::NodeStarted {
            node_id: node.id.clone(),
            input: input.clone(),
        });

        let pacing = self.config.pacing_delay();
        if !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }

        let node_start = Instant::now();
        let result = self.execute_kind(node, &input).await;
        let elapsed_ms = node_start.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(output) => {
                for edge in graph.outgoing(&node.id) {
                    if graph.node(&edge.target).is_none() {
                        warn!(edge = %edge.id, target = %edge.target, "Edge target not in graph, skipping");
                        continue;
                    }
                    queue.push_back((edge.target.clone(), output.clone()));
                }
                debug!(node_id = %node.id, elapsed_ms, "Node succeeded");
                self.emit(RunEvent::NodeSucceeded {
                    node_id: node.id.clone(),
                    output: output.clone(),
                    elapsed_ms,
                });
                FiringOutcome::Success { output }
            }
            Err(e) => {
                if e.is_node_scoped() {
                    warn!(node_id = %node.id, error = %e, "Node failed");
                } else {
                    error!(node_id = %node.id, error = %e, "Node failed unexpectedly");
                }
                let message = e.to_string();
                self.emit(RunEvent::NodeFailed {
                    node_id: node.id.clone(),
                    error: message.clone(),
                    elapsed_ms,
                });
                FiringOutcome::Error { message }
            }
        };

        NodeFiring {
            node_id: node.id.clone(),
            input,
            outcome,
            elapsed_ms,
        }
    }

    async fn execute_kind(&self, node: &Node, input: &str) -> Result<String> {
        match &node.kind {
            NodeKind::Trigger(settings) => Ok(settings.initial_prompt.clone()),
            NodeKind::Agent(settings) => {
                self.client
                    .invoke(input, &InvocationConfig::from(settings))
                    .await
            }
            NodeKind::Search => self.client.search(input).await,
            NodeKind::Output => Ok(input.to_string()),
        }
    }

    fn emit(&self, event: RunEvent) {
        self.board.apply(&event);
        self.event_bus.publish(event);
    }
}
