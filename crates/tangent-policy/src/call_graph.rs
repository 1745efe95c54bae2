//! Per-session call graph: tracks parent→(tool, child) edges and rejects
//! ancestry loops / depth overflow (§4.C).

use std::collections::HashMap;

use parking_lot::Mutex;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CallGraphError {
    #[error("loop detected: tool \"{0}\" already appears in the ancestry")]
    LoopDetected(String),
    #[error("depth exceeded: max depth is {0}")]
    DepthExceeded(usize),
    #[error("call id already registered: {0}")]
    AlreadyRegistered(String),
}

/// Lock-guarded maps from call id to parent call id and from call id to
/// tool name. Safe for concurrent callers.
pub struct CallGraph {
    max_depth: usize,
    parents: Mutex<HashMap<String, String>>,
    tool_names: Mutex<HashMap<String, String>>,
}

impl CallGraph {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            parents: Mutex::new(HashMap::new()),
            tool_names: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new call. An empty `parent_id` means a root call (no
    /// ancestry check). Walks from `parent_id` up the parent chain: fails
    /// if any ancestor's tool-name equals `tool_name`, or if the chain
    /// length would reach `max_depth`.
    pub fn register_call(
        &self,
        parent_id: &str,
        tool_name: &str,
        new_id: &str,
    ) -> Result<(), CallGraphError> {
        let parents = self.parents.lock();
        let tool_names = self.tool_names.lock();

        if tool_names.contains_key(new_id) {
            return Err(CallGraphError::AlreadyRegistered(new_id.to_string()));
        }

        if !parent_id.is_empty() {
            let mut cursor = parent_id.to_string();
            let mut depth = 1usize;
            loop {
                if let Some(name) = tool_names.get(&cursor) {
                    if name == tool_name {
                        return Err(CallGraphError::LoopDetected(tool_name.to_string()));
                    }
                }
                if depth >= self.max_depth {
                    return Err(CallGraphError::DepthExceeded(self.max_depth));
                }
                match parents.get(&cursor) {
                    Some(next) if !next.is_empty() => {
                        cursor = next.clone();
                        depth += 1;
                    }
                    _ => break,
                }
            }
        }

        drop(parents);
        drop(tool_names);
        self.parents
            .lock()
            .insert(new_id.to_string(), parent_id.to_string());
        self.tool_names
            .lock()
            .insert(new_id.to_string(), tool_name.to_string());
        Ok(())
    }

    pub fn get_tool_name(&self, call_id: &str) -> Option<String> {
        self.tool_names.lock().get(call_id).cloned()
    }

    /// Ancestry trace from `call_id` up to the root, inclusive, for
    /// diagnostics.
    pub fn ancestry(&self, call_id: &str) -> Vec<String> {
        let parents = self.parents.lock();
        let mut trace = vec![call_id.to_string()];
        let mut cursor = call_id.to_string();
        while let Some(next) = parents.get(&cursor) {
            if next.is_empty() {
                break;
            }
            trace.push(next.clone());
            cursor = next.clone();
        }
        trace
    }
}
