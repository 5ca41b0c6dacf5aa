use crate::{config::ObjSpec, env::Env, error::PgError};
use anyhow::Result;
use std::collections::HashMap;
use tracing::debug;

pub type EnvConstructor = Box<dyn Fn(&serde_json::Value) -> Result<Box<dyn Env>> + Send + Sync>;

/// Environment constructors addressable by name from a config file.
#[derive(Default)]
pub struct ObjRegistry {
    envs: HashMap<String, EnvConstructor>,
}

impl std::fmt::Debug for ObjRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.envs.keys()).finish()
    }
}

impl ObjRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&serde_json::Value) -> Result<Box<dyn Env>> + Send + Sync + 'static,
    {
        self.envs.insert(name.into(), Box::new(constructor));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.envs.contains_key(name)
    }

    pub fn get_obj(&self, spec: &ObjSpec) -> Result<Box<dyn Env>> {
        let constructor = self
            .envs
            .get(&spec.func)
            .ok_or_else(|| PgError::UnknownObject(spec.func.clone()))?;
        debug!(func = %spec.func, args = %spec.args, "constructing env");
        constructor(&spec.args)
    }
}
