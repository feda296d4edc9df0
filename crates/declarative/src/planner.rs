//! Execution planner - builds resource execution plans

use crate::resource::{BoxedResource, Resource};

/// A command run on the host once every resource has been applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostAction {
    pub description: String,
    pub command: String,
}

impl PostAction {
    pub fn new(description: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            command: command.into(),
        }
    }
}

/// An ordered execution plan
///
/// Resources are applied in insertion order, then post actions run.
#[derive(Debug, Default)]
pub struct ExecutionPlan {
    pub resources: Vec<BoxedResource>,
    /// Post-apply actions (e.g., process restart)
    pub post_actions: Vec<PostAction>,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resource(&mut self, resource: BoxedResource) {
        self.resources.push(resource);
    }

    /// Add a post-apply action, ignoring duplicate commands
    pub fn add_post_action(&mut self, action: PostAction) {
        if !self.post_actions.iter().any(|a| a.command == action.command) {
            self.post_actions.push(action);
        }
    }

    /// Filter plan to only include resources matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&dyn Resource) -> bool,
    {
        Self {
            resources: self
                .resources
                .into_iter()
                .filter(|r| predicate(r.as_ref()))
                .collect(),
            post_actions: self.post_actions,
        }
    }

    /// Filter plan to only include resources matching a target pattern
    ///
    /// Target format: "type", "type.name" or a bare name fragment
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (resource_type, name) = parse_target(t);
                self.filter(|r| matches_filter(r, resource_type.as_deref(), name.as_deref()))
            }
        }
    }

    /// Total number of resources in the plan
    pub fn total_resources(&self) -> usize {
        self.resources.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Parse a target string like "type.name" into (type, name)
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    match target.split_once('.') {
        Some((ty, name)) if !ty.is_empty() && !name.contains('.') => {
            (Some(ty.to_string()), Some(name.to_string()))
        }
        Some(_) => (None, Some(target.to_string())),
        None => (Some(target.to_string()), None),
    }
}

/// Check if a resource matches the filter criteria
///
/// A lone word matches either the resource type or a fragment of the id.
fn matches_filter(resource: &dyn Resource, resource_type: Option<&str>, name: Option<&str>) -> bool {
    match (resource_type, name) {
        (Some(rt), None) => resource.resource_type() == rt || resource.id().contains(rt),
        (Some(rt), Some(n)) => resource.resource_type() == rt && resource.id().contains(n),
        (None, Some(n)) => resource.id().contains(n),
        (None, None) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ApplyContext;
    use crate::types::{ApplyResult, ResourceState};

    #[derive(Debug)]
    struct Named(&'static str);

    impl Resource for Named {
        fn id(&self) -> String {
            self.0.to_string()
        }
        fn description(&self) -> String {
            String::new()
        }
        fn resource_type(&self) -> &'static str {
            "plugin"
        }
        fn current_state(&self, _ctx: &ApplyContext) -> anyhow::Result<ResourceState> {
            Ok(ResourceState::Absent)
        }
        fn desired_state(&self) -> ResourceState {
            ResourceState::Absent
        }
        fn apply(&self, _ctx: &ApplyContext) -> anyhow::Result<ApplyResult> {
            Ok(ApplyResult::NoChange)
        }
    }

    fn plan() -> ExecutionPlan {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(Box::new(Named("@x/plugin-skills")));
        plan.add_resource(Box::new(Named("@x/plugin-rfp")));
        plan
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("plugin"), (Some("plugin".to_string()), None));
        assert_eq!(
            parse_target("plugin.rfp"),
            (Some("plugin".to_string()), Some("rfp".to_string()))
        );
        assert_eq!(parse_target("a.b.c"), (None, Some("a.b.c".to_string())));
    }

    #[test]
    fn test_filter_by_name_fragment() {
        let filtered = plan().filter_by_target(Some("rfp"));
        assert_eq!(filtered.total_resources(), 1);
        assert_eq!(filtered.resources[0].id(), "@x/plugin-rfp");
    }

    #[test]
    fn test_filter_by_type_keeps_all() {
        assert_eq!(plan().filter_by_target(Some("plugin")).total_resources(), 2);
        assert_eq!(plan().filter_by_target(None).total_resources(), 2);
    }

    #[test]
    fn test_post_actions_deduplicated() {
        let mut plan = ExecutionPlan::new();
        plan.add_post_action(PostAction::new("restart", "pm2 restart all"));
        plan.add_post_action(PostAction::new("restart again", "pm2 restart all"));
        assert_eq!(plan.post_actions.len(), 1);
    }
}
