use crate::slot::{Expression, Field};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};

/// Editor placement of a top-level script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Prototype {
        name: String,
        argument_ids: Vec<String>,
        argument_names: Vec<String>,
        argument_defaults: Vec<String>,
        warp: bool,
    },
    Call {
        proccode: String,
        argument_ids: Vec<String>,
        warp: bool,
    },
}

impl Mutation {
    pub fn render(&self) -> Value {
        match self {
            Mutation::Prototype {
                name,
                argument_ids,
                argument_names,
                argument_defaults,
                warp,
            } => json!({
                "tagName": "mutation",
                "children": [],
                "proccode": proccode(name, argument_ids.len()),
                "argumentids": encode_list(argument_ids),
                "argumentnames": encode_list(argument_names),
                "argumentdefaults": encode_list(argument_defaults),
                "warp": warp_flag(*warp),
            }),
            Mutation::Call {
                proccode,
                argument_ids,
                warp,
            } => json!({
                "tagName": "mutation",
                "children": [],
                "proccode": proccode,
                "argumentids": encode_list(argument_ids),
                "warp": warp_flag(*warp),
            }),
        }
    }
}

/// `"<name> %s %s"` with one placeholder per parameter.
pub fn proccode(name: &str, params: usize) -> String {
    let mut code = name.to_string();
    for _ in 0..params {
        code.push_str(" %s");
    }
    code
}

fn encode_list(items: &[String]) -> String {
    Value::from(items.to_vec()).to_string()
}

fn warp_flag(warp: bool) -> &'static str {
    if warp {
        "true"
    } else {
        "false"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub opcode: String,
    pub inputs: IndexMap<String, Expression>,
    pub fields: IndexMap<String, Field>,
    pub next: Option<String>,
    pub parent: Option<String>,
    pub shadow: bool,
    pub top_level: Option<Placement>,
    pub mutation: Option<Mutation>,
}

impl Node {
    pub fn new(id: impl Into<String>, opcode: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            opcode: opcode.into(),
            inputs: IndexMap::new(),
            fields: IndexMap::new(),
            next: None,
            parent: None,
            shadow: false,
            top_level: None,
            mutation: None,
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: Expression) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn shadowed(mut self) -> Self {
        self.shadow = true;
        self
    }

    pub fn is_top_level(&self) -> bool {
        self.top_level.is_some()
    }

    pub fn render(&self) -> Value {
        let inputs: Map<String, Value> = self
            .inputs
            .iter()
            .map(|(name, value)| (name.clone(), value.render()))
            .collect();
        let fields: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, field)| (name.clone(), field.render()))
            .collect();
        let mut out = json!({
            "opcode": self.opcode,
            "next": self.next,
            "parent": self.parent,
            "inputs": inputs,
            "fields": fields,
            "shadow": self.shadow,
            "topLevel": self.is_top_level(),
        });
        if let Value::Object(map) = &mut out {
            if let Some(placement) = self.top_level {
                map.insert("x".to_string(), json!(placement.x));
                map.insert("y".to_string(), json!(placement.y));
            }
            if let Some(mutation) = &self.mutation {
                map.insert("mutation".to_string(), mutation.render());
            }
        }
        out
    }
}
