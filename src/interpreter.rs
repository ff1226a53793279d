//! Evaluation of food definition scripts.
//!
//! Every script runs in its own Lua state with a reduced standard library and a
//! memory cap. The state is dropped as soon as the `food` table has been mapped,
//! so nothing leaks from one revision to the next.

use mlua::{Lua, LuaOptions, LuaSerdeExt, StdLib, Value};
use thiserror::Error;

use crate::model::Food;

/// Name of the global table a food script must define.
pub const FOOD_TABLE: &str = "food";

const MEMORY_LIMIT: usize = 64 * 1024 * 1024;

/// Base library functions that reach the host or the collector.
const REMOVED_GLOBALS: [&str; 4] = ["dofile", "loadfile", "print", "collectgarbage"];

#[derive(Error, Debug)]
pub enum InterpretError {
    #[error("Could not create a Lua state: {0}")]
    State(#[source] mlua::Error),
    #[error("Error while executing the food script: {0}")]
    Execution(#[source] mlua::Error),
    #[error("Food script did not define a `food` table (found {found})")]
    MissingTable { found: String },
    #[error("Error while reading the `food` table: {0}")]
    Mapping(#[source] mlua::Error),
}

/// Outcome of evaluating one revision of a food script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Food(Food),
    /// The script does not parse. Catalog histories contain such revisions,
    /// they are skipped rather than treated as errors.
    Rotten { reason: String },
}

pub fn evaluate(script: &str, chunk_name: &str) -> Result<Evaluation, InterpretError> {
    let lua = sandbox()?;

    match lua.load(script).set_name(chunk_name).exec() {
        Ok(()) => {}
        Err(mlua::Error::SyntaxError { message, .. }) => {
            return Ok(Evaluation::Rotten { reason: message });
        }
        Err(e) => return Err(InterpretError::Execution(e)),
    }

    let table = lua
        .globals()
        .get::<Value>(FOOD_TABLE)
        .map_err(InterpretError::Mapping)?;
    if !matches!(table, Value::Table(_)) {
        return Err(InterpretError::MissingTable {
            found: table.type_name().to_owned(),
        });
    }

    let food = lua
        .from_value::<Food>(table)
        .map_err(InterpretError::Mapping)?;
    Ok(Evaluation::Food(food))
}

fn sandbox() -> Result<Lua, InterpretError> {
    let libs = StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8;
    let lua = Lua::new_with(libs, LuaOptions::default()).map_err(InterpretError::State)?;
    lua.set_memory_limit(MEMORY_LIMIT)
        .map_err(InterpretError::State)?;

    let globals = lua.globals();
    for name in REMOVED_GLOBALS {
        globals.raw_remove(name).map_err(InterpretError::State)?;
    }
    Ok(lua)
}
