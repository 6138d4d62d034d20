use flowcore::{Evaluator, Executor, FlowDefinition, NodeError, Routing};
use serde_json::Value;

/// Routing resolver over one flow definition
pub struct Transition<'a> {
    definition: &'a FlowDefinition,
    evaluator: &'a dyn Evaluator,
    context: &'a Value,
}

impl<'a> Transition<'a> {
    pub fn new(definition: &'a FlowDefinition, evaluator: &'a dyn Evaluator, context: &'a Value) -> Self {
        Self {
            definition,
            evaluator,
            context,
        }
    }

    pub fn is_join(&self, node_name: &str) -> bool {
        self.definition.node(node_name).is_some_and(|spec| spec.is_join())
    }

    pub fn is_split(&self, node_name: &str) -> bool {
        self.definition.node(node_name).is_some_and(|spec| spec.is_split())
    }

    /// Names of the node(s) to run after `node_name`.
    ///
    /// An empty list means the path ends here. A conditional entry without a
    /// condition (or with a blank one) is taken only when it is the last one.
    pub fn resolve_next(&self, node_name: &str, executor: &Executor) -> Result<Vec<String>, NodeError> {
        let Some(routing) = self.definition.routing(node_name) else {
            return Ok(Vec::new());
        };

        match routing {
            Routing::Single(next) => Ok(vec![next.clone()]),
            Routing::Parallel(next) => Ok(next.clone()),
            Routing::Conditional(routes) => {
                let last = routes.len().saturating_sub(1);
                for (idx, route) in routes.iter().enumerate() {
                    let taken = match route.condition.as_deref() {
                        Some(condition) if !route.is_fallback() => {
                            self.evaluator.test(condition, self.context, executor)?
                        }
                        _ => idx == last,
                    };
                    if taken {
                        return Ok(vec![route.next.clone()]);
                    }
                }
                Ok(Vec::new())
            }
        }
    }
}
