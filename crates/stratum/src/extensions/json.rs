// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! JSON module registration for Lua.
//!
//! Provides `json.encode`, `json.decode`, `json.encode_pretty`, and `json.null`.
//! The `@json` directive writes through [`encode`].

use mlua::{Lua, LuaSerdeExt, Result as LuaResult, Table, Value};

/// Encodes a Lua value as JSON text.
pub fn encode(lua: &Lua, value: Value, pretty: bool) -> LuaResult<String> {
    let json: serde_json::Value = lua.from_value(value)?;
    let encoded = if pretty {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    };
    encoded.map_err(|err| mlua::Error::external(format!("JSON encode error: {}", err)))
}

fn json_table(lua: &Lua) -> LuaResult<Table> {
    let module = lua.create_table()?;
    module.set("encode", lua.create_function(|lua, value: Value| encode(lua, value, false))?)?;
    module.set(
        "encode_pretty",
        lua.create_function(|lua, value: Value| encode(lua, value, true))?,
    )?;
    module.set(
        "decode",
        lua.create_function(|lua, text: String| {
            let json: serde_json::Value = serde_json::from_str(&text)
                .map_err(|err| mlua::Error::external(format!("JSON decode error: {}", err)))?;
            lua.to_value(&json)
        })?,
    )?;
    module.set("null", lua.null())?;
    Ok(module)
}

/// Register the json module as a global on the given Lua instance.
///
/// The module is also available through `require("json")`.
///
/// # Example
///
/// ```rust,ignore
/// use mlua::Lua;
/// use stratum::extensions::json::register_json_module;
///
/// let lua = Lua::new();
/// register_json_module(&lua)?;
/// ```
pub fn register_json_module(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();
    globals.set("json", json_table(lua)?)?;

    let package: Table = globals.get("package")?;
    let preload: Table = package.get("preload")?;
    preload.set("json", lua.create_function(|lua, _: ()| json_table(lua))?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_and_decode() {
        let lua = Lua::new();
        register_json_module(&lua).unwrap();
        let encoded: String = lua.load(r#"return json.encode({name = "x"})"#).eval().unwrap();
        assert_eq!(encoded, r#"{"name":"x"}"#);
        let n: i64 = lua.load(r#"return json.decode('{"n": 3}').n"#).eval().unwrap();
        assert_eq!(n, 3);
        let bad = lua.load(r#"return json.decode('{')"#).eval::<Value>();
        assert!(bad.is_err());
    }
}
