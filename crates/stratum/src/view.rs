// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Executable views and runtime failure translation.
//!
//! A compiled body is wrapped into the runtime prelude, which defines the
//! output helpers and returns the render function. Data passed to
//! [`View::render`] becomes the template-local environment; unknown names
//! fall back to the sandboxed globals. Failures are reported against
//! template files through the artifact's source map.

use crate::artifact::Artifact;
use crate::compiler::CompiledResult;
use crate::error::{Result, StratumError};
use crate::sourcemap::SourceMap;
use mlua::{Function, Lua, LuaSerdeExt, Value};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

const PRELUDE: &str = r##"local __globals = _ENV
local __concat = table.concat
local __null = json.null
local __encode = json.encode
local __entities = { ["&"] = "&amp;", ["<"] = "&lt;", [">"] = "&gt;", ['"'] = "&quot;", ["'"] = "&#39;" }
local function __tostring(value)
  if value == nil or value == __null then
    return ""
  end
  return tostring(value)
end
local function __escape(value)
  return (string.gsub(__tostring(value), [=[[&<>"']]=], __entities))
end
local function __json(value)
  return __encode(value)
end
return function(__data, __lookup)
  local __out = {}
  local function __write(value)
    __out[#__out + 1] = value
  end
  local function __service(id)
    local service = __lookup(id)
    if service == nil then
      error("undefined service `" .. __tostring(id) .. "`", 2)
    end
    return service
  end
  local _ENV = setmetatable({}, { __index = function(_, key)
    local value = __data[key]
    if value == nil then
      value = __globals[key]
    end
    return value
  end })
"##;

const EPILOGUE: &str = "  return __concat(__out)\nend\n";

/// Number of chunk lines ahead of the compiled body.
pub(crate) fn prelude_lines() -> usize {
    PRELUDE.lines().count()
}

/// Wraps a compiled body into a definable artifact.
pub(crate) fn assemble(key: &str, template: &str, compiled: CompiledResult) -> Artifact {
    let mut source_map = compiled.source_map;
    source_map.adjust_offsets(prelude_lines());
    let source = format!("{}{}{}", PRELUDE, compiled.content, EPILOGUE);
    Artifact::new(key, template, source, source_map, compiled.paths)
}

/// Maps a failure to load an artifact chunk back to the template.
///
/// Lua syntax errors inside host code become a [`StratumError::ParseError`]
/// at the template line holding the code.
pub(crate) fn load_error(artifact: &Artifact, err: mlua::Error) -> StratumError {
    let root = root_file(artifact);
    if let mlua::Error::SyntaxError { message, .. } = &err {
        let map = &artifact.source_map;
        if let Some(mapping) = map.locate(message, &artifact.id).and_then(|line| map.find(line)) {
            let failure = StratumError::ParseError {
                message: format!("invalid host code: {}", map.translate(message, &artifact.id)),
                file: mapping.file.clone(),
                line: mapping.line,
                source_context: None,
            };
            return StratumError::compile(root, failure);
        }
    }
    StratumError::compile(root, StratumError::LuaError(err))
}

fn root_file(artifact: &Artifact) -> &str {
    artifact.dependencies.first().map(String::as_str).unwrap_or(&artifact.template)
}

/// A compiled template bound to the engine's Lua state.
///
/// Views are cheap to clone and can be rendered any number of times.
#[derive(Clone)]
pub struct View {
    lua: Lua,
    function: Function,
    lookup: Function,
    artifact: Arc<Artifact>,
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("id", &self.artifact.id)
            .field("template", &self.artifact.template)
            .finish()
    }
}

impl View {
    pub(crate) fn new(lua: Lua, function: Function, lookup: Function, artifact: Arc<Artifact>) -> Self {
        Self {
            lua,
            function,
            lookup,
            artifact,
        }
    }

    /// Artifact id, also the Lua chunk name.
    pub fn id(&self) -> &str {
        &self.artifact.id
    }

    /// Template reference this view was compiled from.
    pub fn template(&self) -> &str {
        &self.artifact.template
    }

    /// The underlying artifact.
    pub fn artifact(&self) -> &Arc<Artifact> {
        &self.artifact
    }

    /// Line mapping of the generated chunk.
    pub fn source_map(&self) -> &SourceMap {
        &self.artifact.source_map
    }

    /// Renders the view with `data` as template variables.
    ///
    /// `data` should serialize to a map; anything else renders with no
    /// variables. Runtime failures are returned as
    /// [`StratumError::RenderError`] with template frames, innermost first.
    pub fn render<T: Serialize + ?Sized>(&self, data: &T) -> Result<String> {
        let data = match self.lua.to_value(data)? {
            Value::Table(table) => table,
            _ => self.lua.create_table()?,
        };
        self.function
            .call::<String>((data, self.lookup.clone()))
            .map_err(|err| self.render_error(err))
    }

    fn render_error(&self, cause: mlua::Error) -> StratumError {
        let raw = cause.to_string();
        let map = &self.artifact.source_map;
        let frames = map
            .locate(&raw, &self.artifact.id)
            .map(|line| map.frames(line, root_file(&self.artifact)))
            .unwrap_or_default();
        let message = map.translate(&raw, &self.artifact.id).into_owned();
        tracing::debug!("Render of {} failed: {}", self.artifact.template, message);
        StratumError::RenderError {
            template: self.artifact.template.clone(),
            message,
            frames,
            cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Context;
    use crate::lexer::Grammar;

    fn compiled(content: &str) -> CompiledResult {
        let mut source_map = SourceMap::new(vec!["views/home.stm".into()]);
        source_map.record(1, &Context::new("views/home.stm", 4, Grammar::Host, "<?lua"));
        CompiledResult {
            content: content.to_string(),
            paths: vec!["views/home.stm".into()],
            source_map,
        }
    }

    #[test]
    fn test_assemble_shifts_source_map_past_prelude() {
        let artifact = assemble("k", "home", compiled("__write(\"hi\")\n"));
        let line = prelude_lines() + 1;
        assert_eq!(artifact.source.lines().nth(line - 1), Some("__write(\"hi\")"));
        assert_eq!(artifact.source_map.find(line).map(|m| m.line), Some(4));
        assert!(artifact.source.ends_with(EPILOGUE));
    }

    #[test]
    fn test_syntax_error_maps_to_host_code_line() {
        let artifact = assemble("k", "home", compiled("if then\n"));
        let lua = Lua::new();
        crate::extensions::register_json_module(&lua).unwrap();
        let err = lua
            .load(artifact.source.as_str())
            .set_name(format!("@{}", artifact.id))
            .into_function()
            .unwrap_err();

        match load_error(&artifact, err) {
            StratumError::CompileError { file, source } => {
                assert_eq!(file, "views/home.stm");
                assert!(matches!(*source, StratumError::ParseError { line: 4, .. }));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
