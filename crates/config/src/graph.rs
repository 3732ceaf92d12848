// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graph string parsing.
//!
//! A graph string is a newline-separated set of statements like
//! `a[-P1D]:succeed? & b => c => !d`. Parsing yields, per task, trigger
//! expressions in conjunction-of-disjunction form, plus a spawn map from
//! upstream outputs to the downstream tasks they release.

use rota_core::duration::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors from graph string parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphParseError {
    #[error("graph syntax error at `{at}`: {message}")]
    Syntax { at: String, message: String },
    #[error("bad inter-cycle offset `{0}`")]
    BadOffset(String),
    #[error("opposite outputs of `{task}` must both be optional (`{task}?` / `{task}:fail?`)")]
    OppositeOutputs { task: String },
    #[error("suicide triggers may not appear alone on the right of `=>`: `{0}`")]
    SuicideAlone(String),
    #[error("deprecated output alias `:{alias}` is not supported outside back-compat mode")]
    DeprecatedAlias { alias: String },
    #[error("inter-cycle offset not allowed on the right of `=>`: `{0}`")]
    OffsetOnRight(String),
}

/// Deprecated family-style qualifiers from the legacy graph syntax,
/// rejected outright.
const FAMILY_ALIASES: [&str; 6] = [
    "succeed-all",
    "succeed-any",
    "fail-all",
    "fail-any",
    "finish-all",
    "finish-any",
];

/// One task reference in a trigger expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRef {
    pub task: String,
    /// Inter-cycle offset, e.g. `-P1D` for `foo[-P1D]`
    pub offset: Option<Duration>,
    pub output: String,
}

/// A parsed trigger: every clause (disjunction) must be satisfied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDef {
    pub clauses: Vec<Vec<TriggerRef>>,
    /// Satisfying this trigger removes the task instead of releasing it
    pub suicide: bool,
}

/// An edge in the spawn map: completing `output` of `from` releases `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnEdge {
    pub from: String,
    pub output: String,
    pub to: String,
    /// Forward offset from the upstream point to the downstream point
    /// (the negation of the offset written on the upstream reference).
    pub offset: Option<Duration>,
}

/// The parse result for one graph string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedGraph {
    /// Trigger definitions per downstream task
    pub triggers: HashMap<String, Vec<TriggerDef>>,
    /// Output-completion spawn edges
    pub spawn: Vec<SpawnEdge>,
    /// Every task name appearing in the graph
    pub tasks: HashSet<String>,
    /// Outputs referenced with an optional marker, `(task, output)`
    pub optional_outputs: HashSet<(String, String)>,
    /// Outputs referenced without one, `(task, output)`
    pub required_outputs: HashSet<(String, String)>,
}

/// Whether legacy back-compat semantics apply (from `suite.rc` naming).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CompatMode {
    #[default]
    Current,
    BackCompat,
}

impl CompatMode {
    pub fn is_back_compat(&self) -> bool {
        matches!(self, CompatMode::BackCompat)
    }
}

// --- tokens -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Arrow,
    And,
    Or,
    LParen,
    RParen,
    Node(NodeText),
}

#[derive(Debug, Clone, PartialEq)]
struct NodeText {
    suicide: bool,
    name: String,
    offset: Option<String>,
    qualifier: Option<String>,
    optional: bool,
}

fn tokenize(line: &str) -> Result<Vec<Token>, GraphParseError> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();

    while let Some(&(i, c)) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '&' => {
                chars.next();
                tokens.push(Token::And);
            }
            '|' => {
                chars.next();
                tokens.push(Token::Or);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '=' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '>')) => {
                        chars.next();
                        tokens.push(Token::Arrow);
                    }
                    _ => {
                        return Err(GraphParseError::Syntax {
                            at: line[i..].chars().take(8).collect(),
                            message: "expected `=>`".to_string(),
                        })
                    }
                }
            }
            '!' | '_' | 'a'..='z' | 'A'..='Z' | '0'..='9' => {
                tokens.push(Token::Node(lex_node(line, &mut chars)?));
            }
            other => {
                return Err(GraphParseError::Syntax {
                    at: other.to_string(),
                    message: "unexpected character".to_string(),
                })
            }
        }
    }
    Ok(tokens)
}

fn lex_node(
    line: &str,
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) -> Result<NodeText, GraphParseError> {
    let mut node = NodeText {
        suicide: false,
        name: String::new(),
        offset: None,
        qualifier: None,
        optional: false,
    };

    if let Some(&(_, '!')) = chars.peek() {
        node.suicide = true;
        chars.next();
    }

    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            node.name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if node.name.is_empty() {
        return Err(GraphParseError::Syntax {
            at: line.chars().take(8).collect(),
            message: "expected a task name".to_string(),
        });
    }

    if let Some(&(_, '[')) = chars.peek() {
        chars.next();
        let mut offset = String::new();
        loop {
            match chars.next() {
                Some((_, ']')) => break,
                Some((_, c)) => offset.push(c),
                None => {
                    return Err(GraphParseError::Syntax {
                        at: node.name.clone(),
                        message: "unterminated `[` offset".to_string(),
                    })
                }
            }
        }
        node.offset = Some(offset);
    }

    if let Some(&(_, ':')) = chars.peek() {
        chars.next();
        let mut qualifier = String::new();
        while let Some(&(_, c)) = chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                qualifier.push(c);
                chars.next();
            } else {
                break;
            }
        }
        if qualifier.is_empty() {
            return Err(GraphParseError::Syntax {
                at: node.name.clone(),
                message: "empty `:` qualifier".to_string(),
            });
        }
        node.qualifier = Some(qualifier);
    }

    if let Some(&(_, '?')) = chars.peek() {
        node.optional = true;
        chars.next();
    }

    Ok(node)
}

// --- expression parsing -------------------------------------------------

/// A trigger expression tree, before conversion to clause form.
#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Node(GraphNode),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
struct GraphNode {
    name: String,
    offset: Option<Duration>,
    output: String,
    optional: bool,
    suicide: bool,
}

struct ExprParser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn parse(tokens: &'a [Token]) -> Result<Expr, GraphParseError> {
        let mut p = ExprParser { tokens, pos: 0 };
        let expr = p.or_expr()?;
        if p.pos != p.tokens.len() {
            return Err(GraphParseError::Syntax {
                at: format!("{:?}", p.tokens[p.pos]),
                message: "trailing tokens in expression".to_string(),
            });
        }
        Ok(expr)
    }

    fn or_expr(&mut self) -> Result<Expr, GraphParseError> {
        let mut left = self.and_expr()?;
        while self.eat(&Token::Or) {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, GraphParseError> {
        let mut left = self.primary()?;
        while self.eat(&Token::And) {
            let right = self.primary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<Expr, GraphParseError> {
        match self.tokens.get(self.pos) {
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.or_expr()?;
                if !self.eat(&Token::RParen) {
                    return Err(GraphParseError::Syntax {
                        at: "(".to_string(),
                        message: "unbalanced parentheses".to_string(),
                    });
                }
                Ok(inner)
            }
            Some(Token::Node(text)) => {
                self.pos += 1;
                resolve_node(text)
            }
            other => Err(GraphParseError::Syntax {
                at: format!("{other:?}"),
                message: "expected a task reference".to_string(),
            }),
        }
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.tokens.get(self.pos) == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}

/// Resolve qualifier aliases and build the expression node.
///
/// `:finish` expands to `(succeeded? | failed?)`.
fn resolve_node(text: &NodeText) -> Result<Expr, GraphParseError> {
    let offset = match &text.offset {
        None => None,
        Some(raw) => Some(
            Duration::parse(raw.trim())
                .map_err(|_| GraphParseError::BadOffset(raw.clone()))?,
        ),
    };

    let qualifier = text.qualifier.as_deref().unwrap_or("succeeded");
    if FAMILY_ALIASES.contains(&qualifier) {
        // Ambiguous under mixed-optional graphs; rejected in every mode
        return Err(GraphParseError::DeprecatedAlias {
            alias: qualifier.to_string(),
        });
    }

    if qualifier == "finish" || qualifier == "finished" {
        let make = |output: &str| {
            Expr::Node(GraphNode {
                name: text.name.clone(),
                offset: offset.clone(),
                output: output.to_string(),
                optional: true,
                suicide: text.suicide,
            })
        };
        return Ok(Expr::Or(
            Box::new(make(rota_core::outputs::OUT_SUCCEEDED)),
            Box::new(make(rota_core::outputs::OUT_FAILED)),
        ));
    }

    let output = match qualifier {
        "succeed" => "succeeded",
        "fail" => "failed",
        "submit" => "submitted",
        "submit-fail" => "submit-failed",
        "start" => "started",
        "expire" => "expired",
        other => other,
    };

    Ok(Expr::Node(GraphNode {
        name: text.name.clone(),
        offset,
        output: output.to_string(),
        optional: text.optional,
        suicide: text.suicide,
    }))
}

/// Flatten an expression to conjunction-of-disjunction clause form.
fn to_clauses(expr: &Expr) -> Vec<Vec<GraphNode>> {
    match expr {
        Expr::Node(node) => vec![vec![node.clone()]],
        Expr::And(a, b) => {
            let mut clauses = to_clauses(a);
            clauses.extend(to_clauses(b));
            clauses
        }
        Expr::Or(a, b) => {
            // Distribute: (A) | (B) where A and B are clause lists
            let left = to_clauses(a);
            let right = to_clauses(b);
            let mut out = Vec::new();
            for lc in &left {
                for rc in &right {
                    let mut merged = lc.clone();
                    merged.extend(rc.clone());
                    out.push(merged);
                }
            }
            out
        }
    }
}

fn flat_nodes(expr: &Expr) -> Vec<&GraphNode> {
    match expr {
        Expr::Node(n) => vec![n],
        Expr::And(a, b) | Expr::Or(a, b) => {
            let mut v = flat_nodes(a);
            v.extend(flat_nodes(b));
            v
        }
    }
}

// --- top level ----------------------------------------------------------

/// Parse one graph string (possibly multi-line, `#` comments allowed).
pub fn parse_graph(text: &str, compat: CompatMode) -> Result<ParsedGraph, GraphParseError> {
    let mut graph = ParsedGraph::default();

    for raw_line in text.lines() {
        let line = match raw_line.split_once('#') {
            Some((before, _)) => before.trim(),
            None => raw_line.trim(),
        };
        if line.is_empty() {
            continue;
        }
        parse_statement(line, &mut graph)?;
    }

    validate_opposite_outputs(&graph, compat)?;
    Ok(graph)
}

fn parse_statement(line: &str, graph: &mut ParsedGraph) -> Result<(), GraphParseError> {
    let tokens = tokenize(line)?;

    // Split the token stream on arrows into expression segments
    let mut segments: Vec<&[Token]> = Vec::new();
    let mut start = 0;
    for (i, tok) in tokens.iter().enumerate() {
        if *tok == Token::Arrow {
            segments.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    segments.push(&tokens[start..]);

    let exprs: Vec<Expr> = segments
        .iter()
        .map(|seg| {
            if seg.is_empty() {
                Err(GraphParseError::Syntax {
                    at: line.to_string(),
                    message: "empty expression around `=>`".to_string(),
                })
            } else {
                ExprParser::parse(seg)
            }
        })
        .collect::<Result<_, _>>()?;

    // Record every task and every output reference
    for expr in &exprs {
        for node in flat_nodes(expr) {
            graph.tasks.insert(node.name.clone());
            let key = (node.name.clone(), node.output.clone());
            if node.optional {
                graph.optional_outputs.insert(key);
            } else {
                graph.required_outputs.insert(key);
            }
        }
    }

    // A single-segment statement just declares its tasks on the recurrence
    if exprs.len() == 1 {
        for node in flat_nodes(&exprs[0]) {
            if node.suicide {
                return Err(GraphParseError::SuicideAlone(line.to_string()));
            }
            graph.triggers.entry(node.name.clone()).or_default();
        }
        return Ok(());
    }

    for pair in exprs.windows(2) {
        let (lhs, rhs) = (&pair[0], &pair[1]);
        let rhs_nodes = flat_nodes(rhs);

        if rhs_nodes.iter().all(|n| n.suicide) {
            return Err(GraphParseError::SuicideAlone(line.to_string()));
        }
        if let Some(bad) = rhs_nodes.iter().find(|n| n.offset.is_some()) {
            return Err(GraphParseError::OffsetOnRight(bad.name.clone()));
        }

        let clauses = to_clauses(lhs);
        let trigger_clauses: Vec<Vec<TriggerRef>> = clauses
            .iter()
            .map(|clause| {
                clause
                    .iter()
                    .map(|n| TriggerRef {
                        task: n.name.clone(),
                        offset: n.offset.clone(),
                        output: n.output.clone(),
                    })
                    .collect()
            })
            .collect();

        for rhs_node in &rhs_nodes {
            graph
                .triggers
                .entry(rhs_node.name.clone())
                .or_default()
                .push(TriggerDef {
                    clauses: trigger_clauses.clone(),
                    suicide: rhs_node.suicide,
                });

            // Spawn edges: each upstream output releases this task at the
            // negated offset. Suicide targets are never spawned into
            // existence just to be removed.
            if rhs_node.suicide {
                continue;
            }
            for lhs_node in flat_nodes(lhs) {
                if lhs_node.suicide {
                    continue;
                }
                graph.spawn.push(SpawnEdge {
                    from: lhs_node.name.clone(),
                    output: lhs_node.output.clone(),
                    to: rhs_node.name.clone(),
                    offset: lhs_node.offset.as_ref().map(negate),
                });
            }
        }
    }

    Ok(())
}

fn negate(d: &Duration) -> Duration {
    match d {
        Duration::Integer(n) => Duration::Integer(-n),
        Duration::Iso(iso) => {
            let mut flipped = *iso;
            flipped.negative = !flipped.negative;
            Duration::Iso(flipped)
        }
    }
}

/// A graph referencing both success and failure of a task must mark both
/// optional. Back-compat mode (suite.rc) predates optional outputs and
/// skips the check.
fn validate_opposite_outputs(
    graph: &ParsedGraph,
    compat: CompatMode,
) -> Result<(), GraphParseError> {
    if compat.is_back_compat() {
        return Ok(());
    }
    for task in &graph.tasks {
        for (a, b) in [
            ("succeeded", "failed"),
            ("submitted", "submit-failed"),
        ] {
            let key_a = (task.clone(), a.to_string());
            let key_b = (task.clone(), b.to_string());
            let a_referenced =
                graph.required_outputs.contains(&key_a) || graph.optional_outputs.contains(&key_a);
            let b_referenced =
                graph.required_outputs.contains(&key_b) || graph.optional_outputs.contains(&key_b);
            if a_referenced && b_referenced {
                let a_required = graph.required_outputs.contains(&key_a);
                let b_required = graph.required_outputs.contains(&key_b);
                if a_required || b_required {
                    return Err(GraphParseError::OppositeOutputs { task: task.clone() });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
