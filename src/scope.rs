use crate::ids::IdGen;
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Variable and costume registration for one compiled target.
pub trait Scope {
    /// Looks a variable up, creating it when missing. A namespace turns the
    /// name into `"<namespace>.<name>"`.
    fn ensure_variable(&mut self, name: &str, namespace: Option<&str>) -> String;

    fn local_variable_id_if_exists(&self, name: &str, namespace: &str) -> Option<String>;

    fn global_variable_id_if_exists(&self, name: &str) -> Option<String>;

    fn register_costume(&mut self, path: &str);

    fn variable_names(&self) -> Vec<String>;
}

pub fn qualified_name(name: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(namespace) => format!("{}.{}", namespace, name),
        None => name.to_string(),
    }
}

#[derive(Debug)]
pub struct Target {
    pub name: String,
    pub is_stage: bool,
    pub layer_order: usize,
    variables: IndexMap<String, String>,
    costumes: Vec<String>,
    ids: Arc<IdGen>,
}

impl Target {
    pub fn new(name: impl Into<String>, is_stage: bool, ids: Arc<IdGen>) -> Self {
        Self {
            name: name.into(),
            is_stage,
            layer_order: 0,
            variables: IndexMap::new(),
            costumes: Vec::new(),
            ids,
        }
    }

    pub fn ids(&self) -> Arc<IdGen> {
        Arc::clone(&self.ids)
    }

    pub fn costume_paths(&self) -> &[String] {
        &self.costumes
    }

    /// `{id: [name, 0]}` in declaration order.
    pub fn variables_json(&self) -> Value {
        let map: Map<String, Value> = self
            .variables
            .iter()
            .map(|(name, id)| (id.clone(), json!([name, 0])))
            .collect();
        Value::Object(map)
    }
}

impl Scope for Target {
    fn ensure_variable(&mut self, name: &str, namespace: Option<&str>) -> String {
        let internal = qualified_name(name, namespace);
        if let Some(id) = self.variables.get(&internal) {
            return id.clone();
        }
        let id = self.ids.fresh();
        tracing::debug!(unit = %self.name, variable = %internal, "declared variable");
        self.variables.insert(internal, id.clone());
        id
    }

    fn local_variable_id_if_exists(&self, name: &str, namespace: &str) -> Option<String> {
        self.variables.get(&qualified_name(name, Some(namespace))).cloned()
    }

    fn global_variable_id_if_exists(&self, name: &str) -> Option<String> {
        self.variables.get(name).cloned()
    }

    fn register_costume(&mut self, path: &str) {
        self.costumes.push(path.to_string());
    }

    fn variable_names(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Target {
        Target::new("Sprite1", false, Arc::new(IdGen::sequential("t")))
    }

    #[test]
    fn ensure_variable_is_stable_per_namespace() {
        let mut target = target();
        let global = target.ensure_variable("x", None);
        let local = target.ensure_variable("x", Some("jump"));
        assert_ne!(global, local);
        assert_eq!(target.ensure_variable("x", None), global);
        assert_eq!(target.local_variable_id_if_exists("x", "jump"), Some(local));
        assert_eq!(target.global_variable_id_if_exists("x"), Some(global));
        assert_eq!(target.variable_names(), vec!["x".to_string(), "jump.x".to_string()]);
    }

    #[test]
    fn locals_are_not_globals() {
        let mut target = target();
        target.ensure_variable("y", Some("p"));
        assert!(target.global_variable_id_if_exists("y").is_none());
        assert!(target.local_variable_id_if_exists("y", "q").is_none());
    }

    #[test]
    fn variables_render_by_id() {
        let mut target = target();
        let id = target.ensure_variable("score", None);
        assert_eq!(target.variables_json()[id.as_str()], json!(["score", 0]));
    }
}
