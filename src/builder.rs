use crate::ast::{Args, Declaration, Expr, Literal, LiteralKind, Name, Position, ProcedureDecl, Program, Statement};
use crate::catalog::{self, BlockSpec};
use crate::diagnostic::{pretty_join, Diagnostic, UnitSink};
use crate::ids::IdGen;
use crate::node::{Mutation, Node, Placement};
use crate::procedures::{ProcedureRegistry, ProcedureSignature};
use crate::scope::{qualified_name, Scope};
use crate::slot::{validate_arg, validate_args, Expression, Field, Primitive, RawValue, SlotType};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::mem;
use std::sync::Arc;

const SCRIPT_SPACING: i32 = 240;
const ARGUMENT_REPORTER: &str = "argument_reporter_string_number";

/// The node graph of one compilation unit plus its procedure metadata.
#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    pub blocks: IndexMap<String, Node>,
    pub procedures: ProcedureRegistry,
}

impl BuildOutput {
    pub fn blocks_json(&self) -> Value {
        let map: Map<String, Value> = self
            .blocks
            .iter()
            .map(|(id, node)| (id.clone(), node.render()))
            .collect();
        Value::Object(map)
    }

    pub fn uses_opcode_prefix(&self, prefix: &str) -> bool {
        self.blocks.values().any(|node| node.opcode.starts_with(prefix))
    }

    pub fn top_level(&self) -> impl Iterator<Item = &Node> {
        self.blocks.values().filter(|node| node.is_top_level())
    }
}

/// Where a statement or expression is being compiled.
#[derive(Debug, Clone, Copy, Default)]
struct Context<'c> {
    /// Enclosing procedure, which is also the namespace of its locals.
    procedure: Option<&'c str>,
    params: &'c [String],
}

impl Context<'_> {
    fn has_param(&self, name: &str) -> bool {
        self.procedure.is_some() && self.params.iter().any(|param| param == name)
    }
}

/// Walks a syntax tree and emits the node graph.
///
/// Nodes of the scope being compiled collect on `sequence`, bare values on
/// `exprs`. Entering a substack or an expression saves both and starts empty
/// ones; leaving links and publishes the finished scope before restoring.
pub struct Builder<'a, S: Scope> {
    scope: &'a mut S,
    ids: Arc<IdGen>,
    sink: UnitSink<'a>,
    blocks: IndexMap<String, Node>,
    sequence: Vec<Node>,
    exprs: Vec<RawValue>,
    saved: Vec<(Vec<Node>, Vec<RawValue>)>,
    registry: ProcedureRegistry,
    next_y: i32,
}

impl<'a, S: Scope> Builder<'a, S> {
    pub fn new(scope: &'a mut S, ids: Arc<IdGen>, sink: UnitSink<'a>) -> Self {
        Self {
            scope,
            ids,
            sink,
            blocks: IndexMap::new(),
            sequence: Vec::new(),
            exprs: Vec::new(),
            saved: Vec::new(),
            registry: ProcedureRegistry::new(),
            next_y: 0,
        }
    }

    pub fn build(mut self, program: &Program) -> BuildOutput {
        let mut declared = Vec::new();
        for nowarp in [false, true] {
            for declaration in &program.declarations {
                if let Declaration::Procedure(decl) = declaration {
                    if decl.nowarp == nowarp {
                        if let Some(ids) = self.declare_procedure(decl) {
                            declared.push((decl, ids));
                        }
                    }
                }
            }
        }
        for (decl, (definition_id, prototype_id)) in declared {
            self.compile_procedure_body(decl, definition_id, prototype_id);
        }
        for declaration in &program.declarations {
            match declaration {
                Declaration::Costumes { paths, .. } => self.declare_costumes(paths),
                Declaration::Hat { name, body } => self.compile_hat(name, body),
                Declaration::Procedure(_) => {}
            }
        }
        if !self.saved.is_empty() || !self.sequence.is_empty() {
            self.sink
                .throw(Diagnostic::impossible("A nested scope was left open after the tree walk."));
        }
        tracing::debug!(
            unit = self.sink.unit().unwrap_or(""),
            blocks = self.blocks.len(),
            procedures = self.registry.len(),
            "built unit"
        );
        BuildOutput {
            blocks: self.blocks,
            procedures: self.registry,
        }
    }

    fn fresh_id(&self) -> String {
        self.ids.fresh()
    }

    fn nest(&mut self) {
        let sequence = mem::take(&mut self.sequence);
        let exprs = mem::take(&mut self.exprs);
        self.saved.push((sequence, exprs));
    }

    fn unnest(&mut self) {
        self.order();
        match self.saved.pop() {
            Some((sequence, exprs)) => {
                self.sequence = sequence;
                self.exprs = exprs;
            }
            None => self
                .sink
                .throw(Diagnostic::impossible("Tried to leave a scope that was never entered.")),
        }
    }

    /// Links the finished sequence and publishes it. Links set earlier are kept.
    fn order(&mut self) {
        let ids: Vec<String> = self.sequence.iter().map(|node| node.id.clone()).collect();
        for (index, node) in self.sequence.iter_mut().enumerate() {
            if index > 0 && node.parent.is_none() {
                node.parent = Some(ids[index - 1].clone());
            }
            if index + 1 < ids.len() && node.next.is_none() {
                node.next = Some(ids[index + 1].clone());
            }
        }
        for node in self.sequence.drain(..) {
            self.blocks.insert(node.id.clone(), node);
        }
        self.exprs.clear();
    }

    /// Publishes a node on its own, outside the sequence being built.
    fn publish_alone(&mut self, node: Node) {
        self.nest();
        self.sequence.push(node);
        self.unnest();
    }

    fn publish_top_level(&mut self, mut node: Node) {
        node.top_level = Some(Placement { x: 0, y: self.next_y });
        self.next_y += SCRIPT_SPACING;
        self.publish_alone(node);
    }

    /// Compiles an expression in its own scope and lifts the result into the
    /// slot of `parent_id`.
    fn foster_expr(&mut self, parent_id: &str, expr: &Expr, ctx: Context<'_>) -> RawValue {
        self.nest();
        self.visit_expr(expr, parent_id, ctx);
        let result = if let Some(child) = self.sequence.last_mut() {
            child.parent = Some(parent_id.to_string());
            RawValue::Expr(Expression::Primitive(Primitive::Node(child.id.clone())))
        } else if let Some(value) = self.exprs.pop() {
            value
        } else {
            RawValue::Empty
        };
        self.unnest();
        result
    }

    /// Compiles a statement list in its own scope and returns the id of its
    /// first node.
    fn foster_stack(&mut self, parent_id: &str, body: &[Statement], ctx: Context<'_>) -> Option<String> {
        self.nest();
        for statement in body {
            self.visit_statement(statement, ctx);
        }
        let first = self.sequence.first_mut().map(|node| {
            node.parent = Some(parent_id.to_string());
            node.id.clone()
        });
        self.unnest();
        first
    }

    fn foster_arg(&mut self, parent_id: &str, arg: &Option<Expr>, ctx: Context<'_>) -> RawValue {
        match arg {
            Some(expr) => self.foster_expr(parent_id, expr, ctx),
            None => RawValue::Empty,
        }
    }

    fn declare_costumes(&mut self, paths: &[Literal]) {
        for path in paths {
            if let Some(path) = self.extract_string(path) {
                self.scope.register_costume(&path);
            }
        }
    }

    /// Registers a procedure and emits its prototype and argument reporters.
    /// Returns the ids reserved for the definition node and its prototype.
    fn declare_procedure(&mut self, decl: &ProcedureDecl) -> Option<(String, String)> {
        let name = decl.name.value.as_str();
        if self.registry.get(name).is_some() {
            self.sink.throw(
                Diagnostic::unknown_object(format!("'{}' is already declared as a procedure.", name))
                    .with_hint("Rename one of the declarations.")
                    .at(decl.name.pos),
            );
            return None;
        }
        if catalog::block(name).is_some() {
            tracing::warn!(procedure = name, "procedure is shadowed by a built-in block of the same name");
        }

        let definition_id = self.fresh_id();
        let prototype_id = self.fresh_id();
        let param_names: Vec<String> = decl.params.iter().map(|param| param.value.clone()).collect();
        let param_ids: Vec<String> = param_names.iter().map(|_| self.fresh_id()).collect();
        let warp = !decl.nowarp;

        let mut prototype = Node::new(prototype_id.as_str(), "procedures_prototype")
            .with_parent(definition_id.clone())
            .shadowed();
        for (param_id, param_name) in param_ids.iter().zip(&param_names) {
            prototype = prototype.with_input(
                param_id.clone(),
                Expression::Primitive(Primitive::FunctionReference(param_id.clone())),
            );
            let reporter = Node::new(param_id.clone(), ARGUMENT_REPORTER)
                .with_field("VALUE", Field::Input { name: param_name.clone() })
                .with_parent(prototype_id.clone())
                .shadowed();
            self.publish_alone(reporter);
        }
        prototype.mutation = Some(Mutation::Prototype {
            name: name.to_string(),
            argument_ids: param_ids.clone(),
            argument_names: param_names.clone(),
            argument_defaults: vec![String::new(); param_names.len()],
            warp,
        });
        self.publish_alone(prototype);

        let params = param_ids.into_iter().map(|id| (id, SlotType::String)).collect();
        self.registry
            .register(name, ProcedureSignature::new(name, params, param_names, warp));
        tracing::debug!(procedure = name, warp, "declared procedure");
        Some((definition_id, prototype_id))
    }

    fn compile_procedure_body(&mut self, decl: &ProcedureDecl, definition_id: String, prototype_id: String) {
        let name = decl.name.value.as_str();
        let params: Vec<String> = decl.params.iter().map(|param| param.value.clone()).collect();
        let ctx = Context {
            procedure: Some(name),
            params: &params,
        };
        let mut definition = Node::new(definition_id.clone(), "procedures_definition")
            .with_input("custom_block", Expression::Primitive(Primitive::FunctionReference(prototype_id)));
        definition.next = self.foster_stack(&definition_id, &decl.body, ctx);
        self.publish_top_level(definition);
    }

    fn compile_hat(&mut self, name: &Name, body: &[Statement]) {
        let Some(spec) = catalog::hat(&name.value) else {
            let suggestion = catalog::suggest(&name.value, catalog::names(catalog::HATS));
            self.sink.throw(
                Diagnostic::unknown_object(format!("'{}' is not a known event.", name.value))
                    .with_remediation(suggestion.map(did_you_mean))
                    .at(name.pos),
            );
            return;
        };
        let hat_id = self.fresh_id();
        let mut hat = Node::new(hat_id.clone(), spec.opcode);
        hat.next = self.foster_stack(&hat_id, body, Context::default());
        self.publish_top_level(hat);
        tracing::debug!(hat = spec.name, "compiled script");
    }

    fn visit_statement(&mut self, statement: &Statement, ctx: Context<'_>) {
        let node = match statement {
            Statement::Call { name, args } => self.compile_call(name, args, ctx),
            Statement::IfElse {
                pos,
                condition,
                then_body,
                else_body,
            } => {
                let id = self.fresh_id();
                let condition = self.condition(&id, condition, *pos, ctx);
                let mut node = Node::new(id.clone(), "control_if_else").with_input("CONDITION", condition);
                self.substack(&mut node, "SUBSTACK", then_body, ctx);
                self.substack(&mut node, "SUBSTACK2", else_body, ctx);
                Some(node)
            }
            Statement::Repeat { pos, times, body } => {
                let id = self.fresh_id();
                let value = self.foster_expr(&id, times, ctx);
                let times = self.builtin_slot(value, SlotType::PositiveInteger, *pos);
                let mut node = Node::new(id, "control_repeat").with_input("TIMES", times);
                self.substack(&mut node, "SUBSTACK", body, ctx);
                Some(node)
            }
            Statement::Until { pos, condition, body } => {
                let id = self.fresh_id();
                let condition = self.condition(&id, condition, *pos, ctx);
                let mut node = Node::new(id, "control_repeat_until").with_input("CONDITION", condition);
                self.substack(&mut node, "SUBSTACK", body, ctx);
                Some(node)
            }
            Statement::Forever { body, .. } => {
                let mut node = Node::new(self.fresh_id(), "control_forever");
                self.substack(&mut node, "SUBSTACK", body, ctx);
                Some(node)
            }
            Statement::LocalVar { pos, name, value } => {
                let variable = qualified_name(&name.value, ctx.procedure);
                let variable_id = self.scope.ensure_variable(&name.value, ctx.procedure);
                Some(self.set_variable(variable, variable_id, value, *pos, ctx))
            }
            Statement::VarSet { pos, name, value } => {
                let variable_id = self.scope.ensure_variable(&name.value, None);
                Some(self.set_variable(name.value.clone(), variable_id, value, *pos, ctx))
            }
        };
        if let Some(node) = node {
            self.sequence.push(node);
        }
    }

    fn set_variable(&mut self, variable: String, variable_id: String, value: &Expr, pos: Position, ctx: Context<'_>) -> Node {
        let id = self.fresh_id();
        let value = self.foster_expr(&id, value, ctx);
        let value = self.builtin_slot(value, SlotType::String, pos);
        Node::new(id, "data_setvariableto")
            .with_input("VALUE", value)
            .with_field(
                "VARIABLE",
                Field::Variable {
                    name: variable,
                    id: variable_id,
                },
            )
    }

    fn condition(&mut self, parent_id: &str, condition: &Expr, pos: Position, ctx: Context<'_>) -> Expression {
        let value = self.foster_expr(parent_id, condition, ctx);
        validate_arg(value, SlotType::Boolean, &self.sink, Some(pos))
    }

    /// Compiles a substack; an empty body leaves the input out.
    fn substack(&mut self, node: &mut Node, input: &str, body: &[Statement], ctx: Context<'_>) {
        let parent_id = node.id.clone();
        if let Some(first) = self.foster_stack(&parent_id, body, ctx) {
            node.inputs
                .insert(input.to_string(), Expression::Primitive(Primitive::Reference(first)));
        }
    }

    /// Casts a value for a built-in block slot, putting a literal fallback
    /// behind anything that is not a literal.
    fn builtin_slot(&self, value: RawValue, slot: SlotType, pos: Position) -> Expression {
        let cast = validate_arg(value, slot, &self.sink, Some(pos));
        with_shadow(cast, slot)
    }

    fn compile_call(&mut self, name: &Name, args: &Args, ctx: Context<'_>) -> Option<Node> {
        if let Some(spec) = catalog::block(&name.value) {
            let id = self.fresh_id();
            let (names, slots) = self.resolve_slots(spec);
            let args = self.check_arity("Block", name, args, &slots);
            let values: Vec<RawValue> = args.iter().map(|arg| self.foster_arg(&id, arg, ctx)).collect();
            let casts = validate_args(values, &slots, &self.sink, Some(name.pos));
            let mut node = Node::new(id, spec.opcode);
            for ((input, value), slot) in names.into_iter().zip(casts).zip(&slots) {
                node = node.with_input(input, with_shadow(value, *slot));
            }
            return Some(with_fields(node, spec));
        }

        if let Some(signature) = self.registry.get(&name.value).cloned() {
            let id = self.fresh_id();
            let slots = signature.slot_types();
            let args = self.check_arity("Function", name, args, &slots);
            let values: Vec<RawValue> = args.iter().map(|arg| self.foster_arg(&id, arg, ctx)).collect();
            let casts = validate_args(values, &slots, &self.sink, Some(name.pos));
            let mut node = Node::new(id, signature.opcode);
            for ((param_id, _), value) in signature.params.iter().zip(casts) {
                node = node.with_input(param_id.clone(), value);
            }
            node.mutation = Some(Mutation::Call {
                proccode: signature.proccode.clone(),
                argument_ids: signature.argument_ids(),
                warp: signature.warp,
            });
            return Some(node);
        }

        let suggestion = catalog::suggest(&name.value, catalog::names(catalog::BLOCKS).chain(self.registry.names()));
        self.sink.throw(
            Diagnostic::unknown_object(format!("'{}' is not a known function or block.", name.value))
                .with_remediation(suggestion.map(did_you_mean))
                .at(name.pos),
        );
        None
    }

    /// Input names and slot types of a table entry. Unknown type names are an
    /// internal failure and drop the input.
    fn resolve_slots(&self, spec: &BlockSpec) -> (Vec<&'static str>, Vec<SlotType>) {
        let mut names = Vec::new();
        let mut slots = Vec::new();
        for (input, type_name) in spec.inputs {
            match SlotType::from_name(type_name) {
                Some(slot) => {
                    names.push(*input);
                    slots.push(slot);
                }
                None => self.sink.throw(Diagnostic::impossible(format!(
                    "{}.{} declares the non-existent type {:?}.",
                    spec.name, input, type_name
                ))),
            }
        }
        (names, slots)
    }

    /// Reports excess arguments and returns the ones that fit. A single empty
    /// trailing slot is not an error.
    fn check_arity<'t>(
        &self,
        what: &str,
        name: &Name,
        args: &'t Args,
        slots: &[SlotType],
    ) -> &'t [Option<Expr>] {
        if args.len() <= slots.len() {
            return args;
        }
        let excess = args.len() - slots.len();
        let trailing_empty = excess == 1 && matches!(args.last(), Some(None));
        if !trailing_empty {
            let types: Vec<String> = slots.iter().map(|slot| slot.name().to_string()).collect();
            let explanation = match slots.len() {
                0 => format!("'{}' takes 0 arguments, got {}.", name.value, args.len()),
                1 => format!("'{}' takes 1 argument: {}, got {}.", name.value, types[0], args.len()),
                n => format!(
                    "'{}' takes {} arguments: {}, got {}.",
                    name.value,
                    n,
                    pretty_join(&types, " and "),
                    args.len()
                ),
            };
            self.sink.throw(
                Diagnostic::argument(format!("{} was supplied with too many arguments.\n{}", what, explanation))
                    .with_hint(format!("Remove {} argument{}.", excess, if excess > 1 { "s" } else { "" }))
                    .at(name.pos),
            );
        }
        &args[..slots.len()]
    }

    fn visit_expr(&mut self, expr: &Expr, parent_id: &str, ctx: Context<'_>) {
        match expr {
            Expr::Literal(literal) => {
                let value = match literal.kind {
                    LiteralKind::Number | LiteralKind::Float => Some(literal.text.clone()),
                    LiteralKind::String => self.extract_string(literal),
                };
                self.exprs.push(match value {
                    Some(text) => RawValue::Text(text),
                    None => RawValue::Expr(Expression::error()),
                });
            }
            Expr::Argument { pos, name } => {
                if ctx.has_param(name) {
                    let value = self.parameter_reporter(name, parent_id);
                    self.exprs.push(value);
                } else {
                    self.sink.throw(
                        Diagnostic::unknown_object(format!("'{}' is not a function argument.", name)).at(*pos),
                    );
                    self.exprs.push(RawValue::Expr(Expression::error()));
                }
            }
            Expr::Var { pos, name } => {
                let value = self.variable(name, *pos, parent_id, ctx);
                self.exprs.push(value);
            }
            Expr::Reporter { name, args } => match catalog::operator(&name.value) {
                Some(spec) => {
                    let id = self.fresh_id();
                    let slots = self.resolve_slots(spec);
                    let args = self.check_arity("Operator", name, args, &slots.1);
                    let values = args.iter().map(|arg| self.foster_arg(&id, arg, ctx)).collect();
                    let node = operator_node(spec, id, slots, values, &self.sink, name.pos);
                    self.sequence.push(node);
                }
                None => {
                    let suggestion = catalog::suggest(&name.value, catalog::names(catalog::OPERATORS));
                    self.sink.throw(
                        Diagnostic::unknown_object(format!("'{}' is not a known operator.", name.value))
                            .with_remediation(suggestion.map(did_you_mean))
                            .at(name.pos),
                    );
                    self.exprs.push(RawValue::Expr(Expression::error()));
                }
            },
            Expr::Binary { pos, op, left, right } => {
                let values = [Operand::Expr(left), Operand::Expr(right)];
                self.inline_operator(op.operator_name(), *pos, &values, ctx);
            }
            Expr::Not { pos, operand } => {
                self.inline_operator("notop", *pos, &[Operand::Expr(operand)], ctx);
            }
            Expr::Minus { pos, operand } => {
                let values = [Operand::Text("0"), Operand::Expr(operand)];
                self.inline_operator("sub", *pos, &values, ctx);
            }
        }
    }

    /// Emits an operator node for syntax sugar such as `a + b`, `!a` or `-a`.
    fn inline_operator(&mut self, operator: &str, pos: Position, operands: &[Operand<'_>], ctx: Context<'_>) {
        let Some(spec) = catalog::operator(operator) else {
            self.sink
                .throw(Diagnostic::impossible(format!("'{}' is missing from the operator table.", operator)).at(pos));
            self.exprs.push(RawValue::Expr(Expression::error()));
            return;
        };
        let id = self.fresh_id();
        let values = operands
            .iter()
            .map(|operand| match operand {
                Operand::Text(text) => RawValue::Text(text.to_string()),
                Operand::Expr(expr) => self.foster_expr(&id, expr, ctx),
            })
            .collect();
        let slots = self.resolve_slots(spec);
        let node = operator_node(spec, id, slots, values, &self.sink, pos);
        self.sequence.push(node);
    }

    /// Resolves a bare identifier: procedure local, then parameter, then
    /// global. Inside a procedure an unknown name becomes a new global.
    fn variable(&mut self, name: &str, pos: Position, parent_id: &str, ctx: Context<'_>) -> RawValue {
        if let Some(procedure) = ctx.procedure {
            if let Some(id) = self.scope.local_variable_id_if_exists(name, procedure) {
                return variable_value(qualified_name(name, Some(procedure)), id);
            }
            if ctx.has_param(name) {
                return self.parameter_reporter(name, parent_id);
            }
            let id = self.scope.ensure_variable(name, None);
            return variable_value(name.to_string(), id);
        }
        if let Some(id) = self.scope.global_variable_id_if_exists(name) {
            return variable_value(name.to_string(), id);
        }
        let defined: Vec<String> = self
            .scope
            .variable_names()
            .iter()
            .map(|known| format!("'{}'", known))
            .collect();
        let listing = match defined.len() {
            0 => "No variables are defined yet.".to_string(),
            1 => format!("Defined currently is {}.", defined[0]),
            _ => format!("Defined currently are {}.", pretty_join(&defined, " and ")),
        };
        self.sink.throw(
            Diagnostic::unknown_object(format!("'{}' has not been defined.\n{}", name, listing)).at(pos),
        );
        RawValue::Expr(Expression::error())
    }

    /// Emits a reporter node reading a parameter, owned by the consuming node.
    fn parameter_reporter(&mut self, name: &str, parent_id: &str) -> RawValue {
        let id = self.fresh_id();
        let reporter = Node::new(id.clone(), ARGUMENT_REPORTER)
            .with_field("VALUE", Field::Input { name: name.to_string() })
            .with_parent(parent_id);
        self.publish_alone(reporter);
        RawValue::Expr(Expression::Primitive(Primitive::Parameter(id)))
    }

    /// Inner text of a quoted string leaf.
    fn extract_string(&self, literal: &Literal) -> Option<String> {
        let inner = literal
            .text
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .filter(|_| literal.text.len() >= 2);
        match inner {
            Some(inner) => Some(unescape(inner)),
            None => {
                self.sink.throw(
                    Diagnostic::impossible(format!("Could not extract a string from {:?}.", literal.text))
                        .at(literal.pos),
                );
                None
            }
        }
    }
}

enum Operand<'e> {
    Text(&'static str),
    Expr(&'e Expr),
}

/// Operator inputs are never shadowed.
fn operator_node(
    spec: &BlockSpec,
    id: String,
    (names, slots): (Vec<&'static str>, Vec<SlotType>),
    values: Vec<RawValue>,
    sink: &UnitSink<'_>,
    pos: Position,
) -> Node {
    let casts = validate_args(values, &slots, sink, Some(pos));
    let mut node = Node::new(id, spec.opcode);
    for (input, value) in names.into_iter().zip(casts) {
        node = node.with_input(input, value);
    }
    with_fields(node, spec)
}

fn variable_value(name: String, id: String) -> RawValue {
    RawValue::Expr(Expression::Primitive(Primitive::Variable { name, id }))
}

fn did_you_mean(candidate: String) -> crate::diagnostic::Remediation {
    crate::diagnostic::Remediation::Hint(format!("Did you mean '{}'?", candidate))
}

fn with_shadow(value: Expression, slot: SlotType) -> Expression {
    match value {
        Expression::Primitive(primitive) if !primitive.is_literal() && primitive != Primitive::Error => {
            match slot.default_primitive() {
                Some(front) => Expression::Shadow { front, back: primitive },
                None => Expression::Primitive(primitive),
            }
        }
        other => other,
    }
}

fn with_fields(mut node: Node, spec: &BlockSpec) -> Node {
    for (field, value) in spec.fields {
        node = node.with_field(*field, Field::Input { name: value.to_string() });
    }
    node
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{DiagnosticKind, Diagnostics};
    use crate::parser::parse_source;
    use crate::scope::Target;
    use crate::slot::Num;
    use serde_json::json;

    fn build(source: &str) -> (BuildOutput, Diagnostics, Target) {
        let program = parse_source(source).unwrap();
        let diagnostics = Diagnostics::new();
        let ids = Arc::new(IdGen::sequential("t"));
        let mut target = Target::new("Sprite1", false, Arc::clone(&ids));
        let output = Builder::new(&mut target, ids, diagnostics.sink(Some("main"))).build(&program);
        (output, diagnostics, target)
    }

    fn by_opcode<'o>(output: &'o BuildOutput, opcode: &str) -> Vec<&'o Node> {
        output.blocks.values().filter(|node| node.opcode == opcode).collect()
    }

    fn one<'o>(output: &'o BuildOutput, opcode: &str) -> &'o Node {
        let nodes = by_opcode(output, opcode);
        assert_eq!(nodes.len(), 1, "expected one {}", opcode);
        nodes[0]
    }

    #[test]
    fn sequence_links_parent_and_next() {
        let (output, diagnostics, _) = build("onflag { move(1); turnright(2); turnleft(3); }");
        assert!(diagnostics.is_empty());
        let hat = one(&output, "event_whenflagclicked");
        let first = one(&output, "motion_movesteps");
        let second = one(&output, "motion_turnright");
        let third = one(&output, "motion_turnleft");
        assert_eq!(hat.next.as_deref(), Some(first.id.as_str()));
        assert_eq!(first.parent.as_deref(), Some(hat.id.as_str()));
        assert_eq!(first.next.as_deref(), Some(second.id.as_str()));
        assert_eq!(second.parent.as_deref(), Some(first.id.as_str()));
        assert_eq!(third.parent.as_deref(), Some(second.id.as_str()));
        assert_eq!(third.next, None);
        assert!(hat.is_top_level());
        assert!(!first.is_top_level());
    }

    #[test]
    fn hats_are_separate_scripts() {
        let (output, diagnostics, _) = build("onflag { move(1); }\nonclick { move(2); }");
        assert!(diagnostics.is_empty());
        let flag = one(&output, "event_whenflagclicked");
        let click = one(&output, "event_whenthisspriteclicked");
        assert_eq!(flag.parent, None);
        assert_eq!(click.parent, None);
        assert_ne!(flag.top_level, click.top_level);
        assert_eq!(output.top_level().count(), 2);
    }

    #[test]
    fn operator_argument_is_shadowed_in_block_slot() {
        let (output, diagnostics, _) = build("onflag { move(1 + 2); }");
        assert!(diagnostics.is_empty());
        let add = one(&output, "operator_add");
        let movement = one(&output, "motion_movesteps");
        assert_eq!(add.parent.as_deref(), Some(movement.id.as_str()));
        assert_eq!(
            movement.inputs["STEPS"],
            Expression::Shadow {
                front: Primitive::Number(Num::Int(0)),
                back: Primitive::Node(add.id.clone()),
            }
        );
        assert_eq!(
            add.inputs["NUM1"],
            Expression::Primitive(Primitive::Number(Num::Int(1)))
        );
    }

    #[test]
    fn minus_subtracts_from_zero() {
        let (output, diagnostics, _) = build("onflag { move(-5); }");
        assert!(diagnostics.is_empty());
        let sub = one(&output, "operator_subtract");
        assert_eq!(sub.inputs["NUM1"], Expression::Primitive(Primitive::Number(Num::Int(0))));
        assert_eq!(sub.inputs["NUM2"], Expression::Primitive(Primitive::Number(Num::Int(5))));
    }

    #[test]
    fn mathop_reporter_sets_its_field() {
        let (output, diagnostics, _) = build("onflag { move(sqrt(16)); }");
        assert!(diagnostics.is_empty());
        let mathop = one(&output, "operator_mathop");
        assert_eq!(mathop.fields["OPERATOR"], Field::Input { name: "sqrt".into() });
    }

    #[test]
    fn repeat_and_forever_nest_their_bodies() {
        let (output, diagnostics, _) = build("onflag { repeat 4 { move(10); } forever { turnright(1); } }");
        assert!(diagnostics.is_empty());
        let repeat = one(&output, "control_repeat");
        let forever = one(&output, "control_forever");
        let movement = one(&output, "motion_movesteps");
        assert_eq!(repeat.inputs["TIMES"], Expression::Primitive(Primitive::PositiveInteger(Num::Int(4))));
        assert_eq!(
            repeat.inputs["SUBSTACK"],
            Expression::Primitive(Primitive::Reference(movement.id.clone()))
        );
        assert_eq!(movement.parent.as_deref(), Some(repeat.id.as_str()));
        assert_eq!(movement.next, None);
        assert_eq!(repeat.next.as_deref(), Some(forever.id.as_str()));
    }

    #[test]
    fn repeat_count_must_be_a_positive_integer() {
        let (_, diagnostics, _) = build("onflag { repeat 2.5 { } }");
        assert_eq!(diagnostics.count(DiagnosticKind::Type), 1);
    }

    #[test]
    fn huge_repeat_counts_are_still_integers() {
        let (output, diagnostics, _) = build("onflag { repeat 100000000000000000000 { } }");
        assert!(diagnostics.is_empty());
        assert_eq!(
            one(&output, "control_repeat").inputs["TIMES"].render(),
            json!([1, [6, "100000000000000000000"]])
        );
    }

    #[test]
    fn excess_procedure_arguments_name_the_parameter_types() {
        let (_, diagnostics, _) = build("def jump(h, s) { }\nonflag { jump(1, 2, 3); }");
        let entries = diagnostics.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].description,
            "Function was supplied with too many arguments.\n'jump' takes 2 arguments: string and string, got 3."
        );
    }

    #[test]
    fn locals_are_namespaced_by_procedure() {
        let (output, diagnostics, target) = build("def p(a) { local n = $a; say(n); }");
        assert!(diagnostics.is_empty(), "{:?}", diagnostics.snapshot());
        let set = one(&output, "data_setvariableto");
        let Field::Variable { name, .. } = &set.fields["VARIABLE"] else {
            panic!("expected a variable field");
        };
        assert_eq!(name, "p.n");
        assert!(target.local_variable_id_if_exists("n", "p").is_some());
        let say = one(&output, "looks_say");
        assert!(matches!(
            &say.inputs["MESSAGE"],
            Expression::Shadow { back: Primitive::Variable { name, .. }, .. } if name == "p.n"
        ));
    }

    #[test]
    fn parameters_resolve_to_argument_reporters() {
        let (output, diagnostics, _) = build("def p(a) { say(a); move($a); }");
        assert!(diagnostics.is_empty());
        let reporters: Vec<&Node> = by_opcode(&output, ARGUMENT_REPORTER)
            .into_iter()
            .filter(|node| !node.shadow)
            .collect();
        assert_eq!(reporters.len(), 2);
        let say = one(&output, "looks_say");
        assert_eq!(reporters[0].parent.as_deref(), Some(say.id.as_str()));
        assert!(matches!(
            &say.inputs["MESSAGE"],
            Expression::Shadow { back: Primitive::Parameter(id), .. } if *id == reporters[0].id
        ));
    }

    #[test]
    fn unknown_variable_outside_procedure_is_reported() {
        let (_, diagnostics, _) = build("onflag { say(ghost); }");
        assert_eq!(diagnostics.count(DiagnosticKind::UnknownObject), 1);
        assert_eq!(diagnostics.count(DiagnosticKind::Type), 0);
    }

    #[test]
    fn unknown_variable_inside_procedure_becomes_global() {
        let (_, diagnostics, target) = build("def p { say(ghost); }");
        assert!(diagnostics.is_empty());
        assert!(target.global_variable_id_if_exists("ghost").is_some());
    }

    #[test]
    fn procedures_can_be_called_before_declaration() {
        let (output, diagnostics, _) = build("onflag { later(1, 2); }\nnowarp def later(a, b) { }");
        assert!(diagnostics.is_empty());
        let call = one(&output, "procedures_call");
        let Some(Mutation::Call { proccode, warp, argument_ids }) = &call.mutation else {
            panic!("expected a call mutation");
        };
        assert_eq!(proccode, "later %s %s");
        assert!(!warp);
        assert_eq!(argument_ids.len(), 2);
        assert_eq!(
            call.inputs[argument_ids[0].as_str()],
            Expression::Primitive(Primitive::String("1".into()))
        );
    }

    #[test]
    fn procedure_arguments_are_never_shadowed() {
        let (output, diagnostics, _) = build("def p(a) { }\nonflag { p(1 + 1); }");
        assert!(diagnostics.is_empty());
        let call = one(&output, "procedures_call");
        assert!(call
            .inputs
            .values()
            .all(|value| matches!(value, Expression::Primitive(Primitive::Node(_)))));
    }

    #[test]
    fn duplicate_procedures_are_reported_once() {
        let (output, diagnostics, _) = build("def p { }\ndef p { }");
        assert_eq!(diagnostics.count(DiagnosticKind::UnknownObject), 1);
        assert_eq!(by_opcode(&output, "procedures_definition").len(), 1);
    }

    #[test]
    fn trailing_empty_slot_is_ignored() {
        let (output, diagnostics, _) = build("onflag { move(3,); }");
        assert!(diagnostics.is_empty());
        assert_eq!(one(&output, "motion_movesteps").inputs.len(), 1);
    }

    #[test]
    fn too_many_block_arguments_are_dropped() {
        let (output, diagnostics, _) = build("onflag { move(1, 2 + 3); }");
        assert_eq!(diagnostics.count(DiagnosticKind::Argument), 1);
        assert!(by_opcode(&output, "operator_add").is_empty());
    }

    #[test]
    fn unknown_hat_suggests_known_one() {
        let (_, diagnostics, _) = build("onflga { }");
        let entries = diagnostics.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].hint(), Some("Did you mean 'onflag'?"));
    }

    #[test]
    fn costumes_are_registered_with_the_scope() {
        let (_, diagnostics, target) = build("costumes \"a.svg\", \"b.png\";");
        assert!(diagnostics.is_empty());
        assert_eq!(target.costume_paths(), ["a.svg".to_string(), "b.png".to_string()]);
    }

    #[test]
    fn string_escapes_are_decoded() {
        assert_eq!(unescape(r#"say \"hi\"\n"#), "say \"hi\"\n");
    }
}
