use crate::node::proccode;
use crate::slot::SlotType;
use indexmap::IndexMap;
use serde_json::{json, Value};

pub const CALL_OPCODE: &str = "procedures_call";

/// What a call site needs to know about a declared procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureSignature {
    pub opcode: &'static str,
    /// Parameter id and declared type, in declaration order.
    pub params: Vec<(String, SlotType)>,
    pub param_names: Vec<String>,
    pub proccode: String,
    pub warp: bool,
}

impl ProcedureSignature {
    pub fn new(name: &str, params: Vec<(String, SlotType)>, param_names: Vec<String>, warp: bool) -> Self {
        let proccode = proccode(name, params.len());
        Self {
            opcode: CALL_OPCODE,
            params,
            param_names,
            proccode,
            warp,
        }
    }

    pub fn argument_ids(&self) -> Vec<String> {
        self.params.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn slot_types(&self) -> Vec<SlotType> {
        self.params.iter().map(|(_, slot)| *slot).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcedureRegistry {
    entries: IndexMap<String, ProcedureSignature>,
}

impl ProcedureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a procedure; returns false when the name was already taken.
    pub fn register(&mut self, name: &str, signature: ProcedureSignature) -> bool {
        if self.entries.contains_key(name) {
            return false;
        }
        self.entries.insert(name.to_string(), signature);
        true
    }

    pub fn get(&self, name: &str) -> Option<&ProcedureSignature> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn to_json(&self) -> Value {
        let entries: serde_json::Map<String, Value> = self
            .entries
            .iter()
            .map(|(name, signature)| {
                (
                    name.clone(),
                    json!({
                        "opcode": signature.opcode,
                        "proccode": signature.proccode,
                        "argumentids": signature.argument_ids(),
                        "argumentnames": signature.param_names,
                        "argumenttypes": signature.params.iter().map(|(_, slot)| slot.name()).collect::<Vec<_>>(),
                        "warp": signature.warp,
                    }),
                )
            })
            .collect();
        Value::Object(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature() -> ProcedureSignature {
        ProcedureSignature::new(
            "jump",
            vec![("a1".into(), SlotType::String), ("a2".into(), SlotType::String)],
            vec!["height".into(), "speed".into()],
            true,
        )
    }

    #[test]
    fn signature_derives_proccode_and_ids() {
        let signature = signature();
        assert_eq!(signature.proccode, "jump %s %s");
        assert_eq!(signature.argument_ids(), vec!["a1".to_string(), "a2".to_string()]);
        assert_eq!(signature.slot_types(), vec![SlotType::String, SlotType::String]);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ProcedureRegistry::new();
        assert!(registry.register("jump", signature()));
        assert!(!registry.register("jump", signature()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_serializes_call_metadata() {
        let mut registry = ProcedureRegistry::new();
        registry.register("jump", signature());
        let json = registry.to_json();
        assert_eq!(json["jump"]["proccode"], json!("jump %s %s"));
        assert_eq!(json["jump"]["argumentids"], json!(["a1", "a2"]));
        assert_eq!(json["jump"]["opcode"], json!("procedures_call"));
    }
}
