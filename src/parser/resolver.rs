//! Name and expression resolution
//!
//! Helpers the content pass calls once the symbol tables are complete.
//! Each helper evaluates what it can, records a [`Reference`] for every
//! name it touches, and reports problems at the severity the caller
//! asked for: errors for command positions, warnings for interpolated
//! display text.

use crate::parser::declarations::OwnedCaptures;
use crate::parser::diagnostics::{Diagnostic, DiagnosticAction, Severity};
use crate::parser::state::{LineRecord, ParserState};
use crate::parser::symbols::{Reference, Resolved, SectionKind, SymbolTables};
use crate::parser::token::AssignOp;
use crate::value::{Value, ValueType};

fn diagnostic_at(
    severity: Severity,
    from: usize,
    to: usize,
    message: String,
    source: &'static str,
) -> Diagnostic {
    match severity {
        Severity::Error => Diagnostic::error(from, to, message, source),
        Severity::Warning => Diagnostic::warning(from, to, message, source),
        Severity::Info => Diagnostic::info(from, to, message, source),
    }
}

/* ===================== Expressions ===================== */

/// Evaluate `expr` in the scope owning line `idx`.
///
/// `base` is the absolute offset of the expression's first byte; every
/// reference and diagnostic the evaluator reports is shifted by it.
pub fn resolve_expression(
    state: &mut ParserState<'_>,
    idx: usize,
    expr: &str,
    base: usize,
    severity: Severity,
) -> Option<Value> {
    let scope = state.section_of(idx);
    let context = state.symbols.context_for(&scope);
    let evaluation = state.evaluator.evaluate(expr, &context);

    for reference in &evaluation.references {
        let from = base + reference.from;
        let to = base + reference.to;
        let found = state
            .symbols
            .lookup(&scope, &reference.name)
            .map(|r| (r.id().to_string(), r.label(), section_kind(&r)));

        match (&found, reference.call) {
            (Some((_, _, Some(SectionKind::Function { .. }))), true) => {}
            (Some((_, label, _)), true) => {
                state.push_diagnostic(
                    idx,
                    diagnostic_at(
                        severity,
                        from,
                        to,
                        format!(
                            "'{}' is a {} and cannot be called in an expression",
                            reference.name, label
                        ),
                        "resolver",
                    ),
                );
            }
            (None, true) => {
                state.push_diagnostic(
                    idx,
                    diagnostic_at(
                        severity,
                        from,
                        to,
                        format!("Cannot find a function named '{}'", reference.name),
                        "resolver",
                    ),
                );
            }
            (None, false) => {
                state.push_diagnostic(
                    idx,
                    diagnostic_at(
                        severity,
                        from,
                        to,
                        format!("Cannot find '{}'", reference.name),
                        "resolver",
                    ),
                );
            }
            (Some(_), false) => {}
        }

        state.push_reference(Reference {
            from,
            to,
            name: reference.name.clone(),
            id: found.map(|(id, _, _)| id),
            declaration: false,
        });
    }

    for problem in &evaluation.diagnostics {
        state.push_diagnostic(
            idx,
            diagnostic_at(
                severity,
                base + problem.from,
                base + problem.to,
                problem.message.clone(),
                "evaluator",
            ),
        );
    }

    evaluation.result
}

fn section_kind(resolved: &Resolved<'_>) -> Option<SectionKind> {
    match resolved {
        Resolved::Section(s) => Some(s.kind.clone()),
        _ => None,
    }
}

/// Resolve every template group in a piece of display text, reporting
/// problems as warnings so prose never turns red.
pub fn resolve_template(state: &mut ParserState<'_>, idx: usize, base: usize, text: &str) {
    if !text.contains('{') {
        return;
    }
    let scope = state.section_of(idx);
    let context = state.symbols.context_for(&scope);
    let formatted = state.evaluator.format(text, &context);
    for segment in &formatted.segments {
        resolve_expression(
            state,
            idx,
            &segment.content,
            base + segment.from,
            Severity::Warning,
        );
    }
}

/// Evaluate a condition check and nudge when it is not a boolean.
pub fn resolve_check(state: &mut ParserState<'_>, idx: usize, base: usize, expr: &str) {
    let value = resolve_expression(state, idx, expr, base, Severity::Error);
    if let Some(v) = value {
        if !matches!(v, Value::Bool(_)) {
            state.push_diagnostic(
                idx,
                Diagnostic::warning(
                    base,
                    base + expr.len(),
                    format!("Condition is a {}, not a boolean", v.value_type()),
                    "resolver",
                ),
            );
        }
    }
}

/// Evaluate a return value and, inside a function, compare its type
/// against the declared return type.
pub fn resolve_return(
    state: &mut ParserState<'_>,
    idx: usize,
    base: usize,
    expr: &str,
) -> Option<Value> {
    let scope = state.section_of(idx);
    let returns = state.symbols.sections.get(&scope).and_then(|s| match &s.kind {
        SectionKind::Function { returns } => Some(returns.clone()),
        _ => None,
    });
    let value = resolve_expression(state, idx, expr, base, Severity::Error);
    if let (Some(declared), Some(v)) = (returns, &value) {
        if declared != v.value_type() {
            state.push_diagnostic(
                idx,
                Diagnostic::warning(
                    base,
                    base + expr.len(),
                    format!(
                        "This function returns a {}, but the value is a {}",
                        declared,
                        v.value_type()
                    ),
                    "resolver",
                ),
            );
        }
    }
    value
}

/* ===================== Declarations ===================== */

/// Finish a claimed variable line: record the declaration reference,
/// evaluate the initializer and store the parse-time value.
pub fn resolve_variable(
    state: &mut ParserState<'_>,
    idx: usize,
    line: &LineRecord,
    caps: &OwnedCaptures,
    id: &str,
    duplicate: bool,
) {
    let base = line.content_from();
    let name = caps.text("name").unwrap_or_default();
    let (name_from, name_to) = caps.span("name").unwrap_or((0, 0));
    state.push_reference(Reference {
        from: base + name_from,
        to: base + name_to,
        name,
        id: Some(id.to_string()),
        declaration: !duplicate,
    });

    let declared_type = caps.text("type").map(|t| ValueType::parse(&t));
    let mut value = None;
    if let Some(expr) = caps.text("value") {
        let (value_from, _) = caps.span("value").unwrap_or((0, 0));
        value = resolve_expression(state, idx, &expr, base + value_from, Severity::Error);
        if let (Some(declared), Some(v)) = (&declared_type, &value) {
            if *declared != v.value_type() {
                state.push_diagnostic(
                    idx,
                    Diagnostic::error(
                        base + value_from,
                        base + value_from + expr.len(),
                        format!(
                            "Cannot initialize a {} variable with a {}",
                            declared,
                            v.value_type()
                        ),
                        "resolver",
                    ),
                );
            }
        }
    }

    if !duplicate {
        let resolved = value.or_else(|| declared_type.and_then(|t| t.default_value()));
        if let Some(variable) = state.symbols.variables.get_mut(id) {
            variable.value = resolved;
        }
    }
}

/// Finish a claimed tag line.
pub fn resolve_tag(
    state: &mut ParserState<'_>,
    idx: usize,
    line: &LineRecord,
    caps: &OwnedCaptures,
    id: &str,
    duplicate: bool,
) {
    let base = line.content_from();
    let name = caps.text("name").unwrap_or_default();
    let (name_from, name_to) = caps.span("name").unwrap_or((0, 0));
    state.push_reference(Reference {
        from: base + name_from,
        to: base + name_to,
        name,
        id: Some(id.to_string()),
        declaration: !duplicate,
    });

    if let Some(expr) = caps.text("value") {
        let (value_from, _) = caps.span("value").unwrap_or((0, 0));
        let value = resolve_expression(state, idx, &expr, base + value_from, Severity::Error);
        if !duplicate {
            if let Some(tag) = state.symbols.tags.get_mut(id) {
                tag.value = value;
            }
        }
    }
}

/// Finish a claimed asset line. Asset values must come out as strings;
/// anything else is flagged and dropped.
pub fn resolve_asset(
    state: &mut ParserState<'_>,
    idx: usize,
    line: &LineRecord,
    caps: &OwnedCaptures,
    id: &str,
    duplicate: bool,
) {
    let base = line.content_from();
    let name = caps.text("name").unwrap_or_default();
    let (name_from, name_to) = caps.span("name").unwrap_or((0, 0));
    state.push_reference(Reference {
        from: base + name_from,
        to: base + name_to,
        name,
        id: Some(id.to_string()),
        declaration: !duplicate,
    });

    let Some(expr) = caps.text("value") else {
        return;
    };
    let (value_from, _) = caps.span("value").unwrap_or((0, 0));
    let value = resolve_expression(state, idx, &expr, base + value_from, Severity::Error);
    let value = match value {
        Some(Value::Str(path)) => Some(Value::Str(path)),
        Some(other) => {
            state.push_diagnostic(
                idx,
                Diagnostic::warning(
                    base + value_from,
                    base + value_from + expr.len(),
                    format!("An asset path should be a string, not a {}", other.value_type()),
                    "resolver",
                ),
            );
            None
        }
        None => None,
    };
    if !duplicate {
        if let Some(asset) = state.symbols.assets.get_mut(id) {
            asset.value = value;
        }
    }
}

/// Finish a claimed entity field line. Field values are literals, plus
/// bare references to other entities.
pub fn resolve_entity_field(
    state: &mut ParserState<'_>,
    idx: usize,
    line: &LineRecord,
    caps: &OwnedCaptures,
    entity: &str,
    duplicate: bool,
) {
    let base = line.content_from();
    let field = caps.text("name").unwrap_or_default();
    let (field_from, field_to) = caps.span("name").unwrap_or((0, 0));
    let raw = caps.text("value").unwrap_or_default();
    let (value_from, value_to) = caps.span("value").unwrap_or((0, 0));

    let (value, entity_ref) = entity_literal(&state.symbols, &raw);
    if entity_ref {
        state.push_reference(Reference {
            from: base + value_from,
            to: base + value_to,
            name: raw.clone(),
            id: Some(raw.to_lowercase()),
            declaration: false,
        });
    }

    if duplicate {
        return;
    }
    let key = entity.to_lowercase();
    let already = state
        .symbols
        .entities
        .get(&key)
        .is_some_and(|e| e.fields.contains_key(&field));
    if already {
        state.push_diagnostic(
            idx,
            Diagnostic::warning(
                base + field_from,
                base + field_to,
                format!("Field '{}' is already set", field),
                "resolver",
            ),
        );
        return;
    }
    if let Some(e) = state.symbols.entities.get_mut(&key) {
        e.fields.insert(field, value);
    }
}

/// Parse an entity field literal. A bare word that names another entity
/// becomes a reference to it; anything unrecognized falls back to a
/// plain string.
fn entity_literal(symbols: &SymbolTables, raw: &str) -> (Value, bool) {
    if let Ok(n) = raw.parse::<f64>() {
        return (Value::Num(n), false);
    }
    match raw {
        "true" => return (Value::Bool(true), false),
        "false" => return (Value::Bool(false), false),
        _ => {}
    }
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return (Value::Str(raw[1..raw.len() - 1].to_string()), false);
    }
    if let Some(e) = symbols.entities.get(&raw.to_lowercase()) {
        return (e.as_value(), true);
    }
    (Value::Str(raw.to_string()), false)
}

/* ===================== Commands ===================== */

/// Resolve the target of an assignment and type-check the operation.
/// Returns the variable's qualified id when the target is assignable.
pub fn resolve_assign(
    state: &mut ParserState<'_>,
    idx: usize,
    line: &LineRecord,
    caps: &OwnedCaptures,
    op: AssignOp,
) -> Option<String> {
    let base = line.content_from();
    let name = caps.text("name").unwrap_or_default();
    let (name_from, name_to) = caps.span("name").unwrap_or((0, 0));
    let expr = caps.text("value").unwrap_or_default();
    let (value_from, _) = caps.span("value").unwrap_or((0, 0));

    let scope = state.section_of(idx);
    let found = state.symbols.lookup(&scope, &name).map(|r| {
        let target_type = match &r {
            Resolved::Variable(v) => v.effective_type(),
            _ => None,
        };
        (
            r.id().to_string(),
            r.label(),
            matches!(r, Resolved::Variable(_)),
            target_type,
        )
    });
    let value = resolve_expression(state, idx, &expr, base + value_from, Severity::Error);
    let value_type = value.as_ref().map(|v| v.value_type());
    let value_span = (base + value_from, base + value_from + expr.len());

    match found {
        Some((id, _, true, target_type)) => {
            state.push_reference(Reference {
                from: base + name_from,
                to: base + name_to,
                name,
                id: Some(id.clone()),
                declaration: false,
            });
            check_assign_types(state, idx, op, target_type, value_type, value_span);
            Some(id)
        }
        Some((id, label, false, _)) => {
            state.push_reference(Reference {
                from: base + name_from,
                to: base + name_to,
                name: name.clone(),
                id: Some(id),
                declaration: false,
            });
            state.push_diagnostic(
                idx,
                Diagnostic::error(
                    base + name_from,
                    base + name_to,
                    format!("Cannot assign to a {}", label),
                    "resolver",
                ),
            );
            None
        }
        None => {
            state.push_reference(Reference {
                from: base + name_from,
                to: base + name_to,
                name: name.clone(),
                id: None,
                declaration: false,
            });
            state.push_diagnostic(
                idx,
                Diagnostic::error(
                    base + name_from,
                    base + name_to,
                    format!("Cannot find a variable named '{}'", name),
                    "resolver",
                ),
            );
            None
        }
    }
}

fn check_assign_types(
    state: &mut ParserState<'_>,
    idx: usize,
    op: AssignOp,
    target: Option<ValueType>,
    value: Option<ValueType>,
    span: (usize, usize),
) {
    let mut report = |message: String| {
        state.push_diagnostic(
            idx,
            Diagnostic::error(span.0, span.1, message, "resolver"),
        );
    };
    match op {
        AssignOp::Set => {
            if let (Some(t), Some(v)) = (&target, &value) {
                if t != v {
                    report(format!("Cannot assign a {} to a {} variable", v, t));
                }
            }
        }
        AssignOp::Add => {
            match &target {
                Some(ValueType::Num) => {
                    if let Some(v) = &value {
                        if *v != ValueType::Num {
                            report(format!("Cannot use '+=' with a {} value", v));
                        }
                    }
                }
                Some(ValueType::Str) | None => {}
                Some(t) => report(format!("Cannot use '+=' on a {} variable", t)),
            }
        }
        AssignOp::Sub | AssignOp::Mul | AssignOp::Div => {
            let symbol = op.symbol();
            if let Some(t) = &target {
                if *t != ValueType::Num {
                    report(format!("Cannot use '{}' on a {} variable", symbol, t));
                    return;
                }
            }
            if let Some(v) = &value {
                if *v != ValueType::Num {
                    report(format!("Cannot use '{}' with a {} value", symbol, v));
                }
            }
        }
    }
}

/// Resolve a jump target: a relative marker, a template of candidate
/// section names, or a single name. One resolved id (or `None`) per
/// candidate comes back, in template order.
pub fn resolve_jump_target(
    state: &mut ParserState<'_>,
    idx: usize,
    base: usize,
    target: &str,
) -> Vec<Option<String>> {
    let mut chars = target.chars();
    if let (Some(marker), None) = (chars.next(), chars.next()) {
        if matches!(marker, '!' | '<' | '>' | ']' | '[' | '^') {
            return vec![resolve_relative_target(state, idx, base, base + 1, marker)];
        }
    }
    if target.contains('{') {
        return resolve_target_template(state, idx, base, target);
    }
    let scope = state.section_of(idx);
    vec![resolve_section_name(
        state,
        idx,
        base,
        base + target.len(),
        target,
        &scope,
    )]
}

fn resolve_target_template(
    state: &mut ParserState<'_>,
    idx: usize,
    base: usize,
    target: &str,
) -> Vec<Option<String>> {
    let scope = state.section_of(idx);
    let context = state.symbols.context_for(&scope);
    let formatted = state.evaluator.format(target, &context);

    if formatted.segments.is_empty() {
        state.push_diagnostic(
            idx,
            Diagnostic::error(
                base,
                base + target.len(),
                "Invalid jump target".to_string(),
                "resolver",
            ),
        );
        return vec![None];
    }

    formatted
        .segments
        .iter()
        .map(|segment| {
            let name = segment.content.clone();
            resolve_section_name(
                state,
                idx,
                base + segment.from,
                base + segment.from + segment.content.len(),
                &name,
                &scope,
            )
        })
        .collect()
}

/// Resolve one candidate section name. Only plain sections are legal
/// jump targets; callables and value declarations are flagged with a
/// Focus action pointing at their declaration.
fn resolve_section_name(
    state: &mut ParserState<'_>,
    idx: usize,
    from: usize,
    to: usize,
    name: &str,
    scope: &str,
) -> Option<String> {
    let found = state.symbols.lookup(scope, name).map(|r| {
        let span = r.span();
        (r.id().to_string(), r.label(), section_kind(&r), span)
    });
    match found {
        Some((id, _, Some(SectionKind::Section), _)) => {
            state.push_reference(Reference {
                from,
                to,
                name: name.to_string(),
                id: Some(id.clone()),
                declaration: false,
            });
            Some(id)
        }
        Some((id, label, kind, (decl_from, decl_to))) => {
            state.push_reference(Reference {
                from,
                to,
                name: name.to_string(),
                id: Some(id),
                declaration: false,
            });
            let message = if kind.is_some() {
                format!("'{}' is a {}, not a section", name, label)
            } else {
                format!("Cannot jump to a {}", label)
            };
            state.push_diagnostic(
                idx,
                Diagnostic::error(from, to, message, "resolver").with_action(
                    DiagnosticAction::Focus {
                        from: decl_from,
                        to: decl_to,
                    },
                ),
            );
            None
        }
        None => {
            state.push_reference(Reference {
                from,
                to,
                name: name.to_string(),
                id: None,
                declaration: false,
            });
            state.push_diagnostic(
                idx,
                Diagnostic::error(
                    from,
                    to,
                    format!("Cannot find section named '{}'", name),
                    "resolver",
                ),
            );
            None
        }
    }
}

fn resolve_relative_target(
    state: &mut ParserState<'_>,
    idx: usize,
    from: usize,
    to: usize,
    marker: char,
) -> Option<String> {
    let scope = state.section_of(idx);
    let outcome: Result<String, &'static str> = match marker {
        '!' => {
            if scope.is_empty() {
                Err("There is no enclosing section to jump back to")
            } else {
                Ok(scope.clone())
            }
        }
        '<' => SymbolTables::parent_id(&scope)
            .map(str::to_string)
            .ok_or("There is no parent section to jump to"),
        '>' => next_section_after(&state.symbols, &scope)
            .ok_or("There is no next section to jump to"),
        ']' => adjacent_sibling(&state.symbols, &scope, true)
            .ok_or("There is no next sibling section to jump to"),
        '[' => adjacent_sibling(&state.symbols, &scope, false)
            .ok_or("There is no previous sibling section to jump to"),
        '^' => first_child_section(&state.symbols, &scope)
            .ok_or("There is no child section to jump to"),
        _ => Err("Invalid jump target"),
    };
    match outcome {
        Ok(id) => Some(id),
        Err(message) => {
            state.push_diagnostic(
                idx,
                Diagnostic::error(from, to, message.to_string(), "resolver"),
            );
            None
        }
    }
}

/// Next plain section after `scope` in document order.
fn next_section_after(symbols: &SymbolTables, scope: &str) -> Option<String> {
    let at = symbols.section_order.iter().position(|id| id == scope)?;
    symbols.section_order[at + 1..]
        .iter()
        .find(|id| {
            matches!(
                symbols.sections.get(*id).map(|s| &s.kind),
                Some(SectionKind::Section)
            )
        })
        .cloned()
}

/// The sibling directly before or after `scope`, when it is a plain
/// section.
fn adjacent_sibling(symbols: &SymbolTables, scope: &str, forward: bool) -> Option<String> {
    let parent = SymbolTables::parent_id(scope)?;
    let siblings = symbols.children_of(parent);
    let at = siblings.iter().position(|s| s.id == scope)?;
    let target = if forward {
        at.checked_add(1)?
    } else {
        at.checked_sub(1)?
    };
    siblings
        .get(target)
        .filter(|s| s.kind == SectionKind::Section)
        .map(|s| s.id.clone())
}

fn first_child_section(symbols: &SymbolTables, scope: &str) -> Option<String> {
    symbols
        .children_of(scope)
        .into_iter()
        .find(|s| s.kind == SectionKind::Section)
        .map(|s| s.id.clone())
}

/// Resolve a `name()` command to a callable section id.
pub fn resolve_call(
    state: &mut ParserState<'_>,
    idx: usize,
    from: usize,
    to: usize,
    name: &str,
) -> Option<String> {
    let scope = state.section_of(idx);
    let found = state
        .symbols
        .lookup(&scope, name)
        .map(|r| (r.id().to_string(), r.label(), section_kind(&r)));
    match found {
        Some((id, _, Some(SectionKind::Method | SectionKind::Function { .. }))) => {
            state.push_reference(Reference {
                from,
                to,
                name: name.to_string(),
                id: Some(id.clone()),
                declaration: false,
            });
            Some(id)
        }
        Some((id, label, _)) => {
            state.push_reference(Reference {
                from,
                to,
                name: name.to_string(),
                id: Some(id),
                declaration: false,
            });
            state.push_diagnostic(
                idx,
                Diagnostic::error(
                    from,
                    to,
                    format!("'{}' is a {} and cannot be called", name, label),
                    "resolver",
                ),
            );
            None
        }
        None => {
            state.push_reference(Reference {
                from,
                to,
                name: name.to_string(),
                id: None,
                declaration: false,
            });
            state.push_diagnostic(
                idx,
                Diagnostic::error(
                    from,
                    to,
                    format!("Cannot find a function or method named '{}'", name),
                    "resolver",
                ),
            );
            None
        }
    }
}

/// Resolve a speaker cue against the entity table. Undeclared speakers
/// are fine; the reference simply stays unresolved.
pub fn resolve_cue(
    state: &mut ParserState<'_>,
    from: usize,
    to: usize,
    name: &str,
) -> Option<String> {
    let key = name.to_lowercase();
    let id = state.symbols.entities.contains_key(&key).then_some(key);
    state.push_reference(Reference {
        from,
        to,
        name: name.to_string(),
        id: id.clone(),
        declaration: false,
    });
    id
}
