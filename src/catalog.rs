/// One built-in opcode: the source name, the runtime opcode, its typed input
/// slots and its fixed fields.
#[derive(Debug, Clone, Copy)]
pub struct BlockSpec {
    pub name: &'static str,
    pub opcode: &'static str,
    pub inputs: &'static [(&'static str, &'static str)],
    pub fields: &'static [(&'static str, &'static str)],
}

const fn spec(
    name: &'static str,
    opcode: &'static str,
    inputs: &'static [(&'static str, &'static str)],
    fields: &'static [(&'static str, &'static str)],
) -> BlockSpec {
    BlockSpec {
        name,
        opcode,
        inputs,
        fields,
    }
}

pub const HATS: &[BlockSpec] = &[
    spec("onflag", "event_whenflagclicked", &[], &[]),
    spec("onclick", "event_whenthisspriteclicked", &[], &[]),
];

pub const BLOCKS: &[BlockSpec] = &[
    // Motion
    spec("move", "motion_movesteps", &[("STEPS", "number")], &[]),
    spec("turnright", "motion_turnright", &[("DEGREES", "number")], &[]),
    spec("turnleft", "motion_turnleft", &[("DEGREES", "number")], &[]),
    spec("goto", "motion_gotoxy", &[("X", "number"), ("Y", "number")], &[]),
    spec(
        "glide",
        "motion_glidesecstoxy",
        &[("SECS", "number"), ("X", "number"), ("Y", "number")],
        &[],
    ),
    spec("point", "motion_pointindirection", &[("DIRECTION", "angle")], &[]),
    spec("changex", "motion_changexby", &[("DX", "number")], &[]),
    spec("setx", "motion_setx", &[("X", "number")], &[]),
    spec("changey", "motion_changeyby", &[("DY", "number")], &[]),
    spec("sety", "motion_sety", &[("Y", "number")], &[]),
    spec("ifonedgebounce", "motion_ifonedgebounce", &[], &[]),
    // Looks
    spec("say", "looks_say", &[("MESSAGE", "string")], &[]),
    spec("think", "looks_think", &[("MESSAGE", "string")], &[]),
    spec("show", "looks_show", &[], &[]),
    spec("hide", "looks_hide", &[], &[]),
    // Control
    spec("wait", "control_wait", &[("DURATION", "positive_number")], &[]),
    // Pen
    spec("clear", "pen_clear", &[], &[]),
    spec("stamp", "pen_stamp", &[], &[]),
    spec("pendown", "pen_penDown", &[], &[]),
    spec("penup", "pen_penUp", &[], &[]),
    spec("setpencolor", "pen_setPenColorToColor", &[("COLOR", "color")], &[]),
    spec("setpensize", "pen_setPenSizeTo", &[("SIZE", "number")], &[]),
    spec("changepensize", "pen_changePenSizeBy", &[("SIZE", "number")], &[]),
];

pub const OPERATORS: &[BlockSpec] = &[
    spec("eq", "operator_equals", &[("OPERAND1", "string"), ("OPERAND2", "string")], &[]),
    spec("gt", "operator_gt", &[("OPERAND1", "string"), ("OPERAND2", "string")], &[]),
    spec("lt", "operator_lt", &[("OPERAND1", "string"), ("OPERAND2", "string")], &[]),
    spec("notop", "operator_not", &[("OPERAND", "boolean")], &[]),
    spec("add", "operator_add", &[("NUM1", "number"), ("NUM2", "number")], &[]),
    spec("sub", "operator_subtract", &[("NUM1", "number"), ("NUM2", "number")], &[]),
    spec("mul", "operator_multiply", &[("NUM1", "number"), ("NUM2", "number")], &[]),
    spec("div", "operator_divide", &[("NUM1", "number"), ("NUM2", "number")], &[]),
    spec("random", "operator_random", &[("FROM", "number"), ("TO", "number")], &[]),
    spec("sin", "operator_mathop", &[("NUM", "number")], &[("OPERATOR", "sin")]),
    spec("cos", "operator_mathop", &[("NUM", "number")], &[("OPERATOR", "cos")]),
    spec("sqrt", "operator_mathop", &[("NUM", "number")], &[("OPERATOR", "sqrt")]),
    spec("abs", "operator_mathop", &[("NUM", "number")], &[("OPERATOR", "abs")]),
    spec("mousex", "sensing_mousex", &[], &[]),
    spec("mousey", "sensing_mousey", &[], &[]),
];

fn find(table: &'static [BlockSpec], name: &str) -> Option<&'static BlockSpec> {
    table.iter().find(|spec| spec.name == name)
}

pub fn hat(name: &str) -> Option<&'static BlockSpec> {
    find(HATS, name)
}

pub fn block(name: &str) -> Option<&'static BlockSpec> {
    find(BLOCKS, name)
}

pub fn operator(name: &str) -> Option<&'static BlockSpec> {
    find(OPERATORS, name)
}

pub fn names<'a>(table: &'a [BlockSpec]) -> impl Iterator<Item = &'a str> + 'a {
    table.iter().map(|spec| spec.name)
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut dp = vec![vec![0usize; b.len() + 1]; a.len() + 1];

    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=b.len() {
        dp[0][j] = j;
    }

    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1).min(dp[i][j - 1] + 1).min(dp[i - 1][j - 1] + cost);
        }
    }
    dp[a.len()][b.len()]
}

/// Closest known name by edit distance, if any is close enough. Ties go to
/// the earlier candidate.
pub fn suggest<'a, I>(typo: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let limit = (typo.chars().count() / 2).max(1);
    candidates
        .into_iter()
        .map(|candidate| (levenshtein(typo, candidate), candidate))
        .filter(|(distance, _)| *distance <= limit)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate.to_string())
}
