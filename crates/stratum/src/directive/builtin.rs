// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Built-in directive providers.

use super::{directive_error, DirectiveProvider};
use crate::ast::Directive;
use crate::error::Result;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FOREACH: Regex = Regex::new(r"^(?s)(.+?)\s+as\s+(.+)$").expect("valid foreach pattern");
    static ref IDENT: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier pattern");
}

/// Non-empty directive body, or an error naming what it should hold.
fn body<'d>(directive: &'d Directive, what: &str) -> Result<&'d str> {
    match directive.body.as_deref().map(str::trim) {
        Some(body) if !body.is_empty() => Ok(body),
        _ => Err(directive_error(directive, format!("{} is required", what))),
    }
}

fn identifier<'v>(directive: &Directive, value: &'v str) -> Result<&'v str> {
    let name = value.trim().trim_start_matches('$');
    if IDENT.is_match(name) {
        Ok(name)
    } else {
        Err(directive_error(directive, format!("`{}` is not a valid variable name", value.trim())))
    }
}

/// `@if`, `@elseif`, `@else`, `@endif`, `@unless`, `@endunless`, `@isset`, `@endisset`.
#[derive(Debug, Default)]
pub struct ConditionalDirectives;

impl DirectiveProvider for ConditionalDirectives {
    fn names(&self) -> &'static [&'static str] {
        &["if", "elseif", "else", "endif", "unless", "endunless", "isset", "endisset"]
    }

    fn render(&self, directive: &Directive) -> Result<String> {
        Ok(match directive.name.as_str() {
            "if" => format!("if {} then", body(directive, "a condition")?),
            "elseif" => format!("elseif {} then", body(directive, "a condition")?),
            "unless" => format!("if not ({}) then", body(directive, "a condition")?),
            "isset" => format!("if ({}) ~= nil then", body(directive, "an expression")?),
            "else" => "else".to_string(),
            _ => "end".to_string(),
        })
    }
}

/// `@foreach`, `@for`, `@while`, their closers and `@break`.
///
/// `@foreach(items as item)` iterates a sequence with `ipairs`;
/// `@foreach(map as key, value)` iterates any table with `pairs`.
#[derive(Debug, Default)]
pub struct LoopDirectives;

impl LoopDirectives {
    fn foreach(directive: &Directive) -> Result<String> {
        let body = body(directive, "a loop expression")?;
        let captures = FOREACH
            .captures(body)
            .ok_or_else(|| directive_error(directive, "expected `<expr> as <name>`"))?;
        let source = captures[1].trim();
        let targets: Vec<&str> = captures[2].split(',').collect();
        match targets.as_slice() {
            [item] => Ok(format!(
                "for _, {} in ipairs({}) do",
                identifier(directive, item)?,
                source
            )),
            [key, value] => Ok(format!(
                "for {}, {} in pairs({}) do",
                identifier(directive, key)?,
                identifier(directive, value)?,
                source
            )),
            _ => Err(directive_error(directive, "at most 2 loop variables are allowed")),
        }
    }
}

impl DirectiveProvider for LoopDirectives {
    fn names(&self) -> &'static [&'static str] {
        &["foreach", "endforeach", "for", "endfor", "while", "endwhile", "break"]
    }

    fn render(&self, directive: &Directive) -> Result<String> {
        match directive.name.as_str() {
            "foreach" => Self::foreach(directive),
            "for" => Ok(format!("for {} do", body(directive, "a loop header")?)),
            "while" => Ok(format!("while {} do", body(directive, "a condition")?)),
            "break" => Ok("break".to_string()),
            _ => Ok("end".to_string()),
        }
    }
}

/// `@json(expr)` writes the JSON encoding of a value.
#[derive(Debug, Default)]
pub struct JsonDirectives;

impl DirectiveProvider for JsonDirectives {
    fn names(&self) -> &'static [&'static str] {
        &["json"]
    }

    fn render(&self, directive: &Directive) -> Result<String> {
        Ok(format!("__write(__json({}))", body(directive, "a value")?))
    }
}

/// `@inject(var, "id")` binds a service from the render's locator to a local.
#[derive(Debug, Default)]
pub struct ContainerDirectives;

impl DirectiveProvider for ContainerDirectives {
    fn names(&self) -> &'static [&'static str] {
        &["inject"]
    }

    fn render(&self, directive: &Directive) -> Result<String> {
        let [name, id] = directive.values.as_slice() else {
            return Err(directive_error(directive, "exactly 2 values are required"));
        };
        let name = identifier(directive, name)?;
        if id.trim().is_empty() {
            return Err(directive_error(directive, "a service id is required"));
        }
        Ok(format!("local {} = __service({})", name, id.trim()))
    }
}

/// `@route(name, params...)` writes a URI generated by the `router` service.
#[derive(Debug, Default)]
pub struct RouteDirectives;

impl DirectiveProvider for RouteDirectives {
    fn names(&self) -> &'static [&'static str] {
        &["route"]
    }

    fn render(&self, directive: &Directive) -> Result<String> {
        if directive.values.is_empty() {
            return Err(directive_error(directive, "at least 1 value is required"));
        }
        Ok(format!(
            "__write(__escape(__service(\"router\"):uri({})))",
            directive.values.join(", ")
        ))
    }
}

/// `@lua(statement)` emits a host statement verbatim; `@end` closes a host block.
#[derive(Debug, Default)]
pub struct LuaDirectives;

impl DirectiveProvider for LuaDirectives {
    fn names(&self) -> &'static [&'static str] {
        &["lua", "end"]
    }

    fn render(&self, directive: &Directive) -> Result<String> {
        match directive.name.as_str() {
            "lua" => Ok(body(directive, "a statement")?.to_string()),
            _ => Ok("end".to_string()),
        }
    }
}
