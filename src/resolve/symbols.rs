//! Symbol table implementation

use crate::common::{NodeId, Span};
use crate::types::{Signature, Type};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;

/// Unique definition ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefId(pub u32);

/// Kind of definition, with the storage it was assigned
#[derive(Debug, Clone, PartialEq)]
pub enum DefKind {
    /// Global array; `index` is its position in declaration order
    Array { index: u32, elem: Type, len: u32 },
    /// Routine; `index` is its position in declaration order
    Routine { index: u32, signature: Signature },
    /// Routine parameter
    Param { slot: u32, ty: Type },
    /// Variable from a `with` clause
    Local { slot: u32, ty: Type },
    /// Control variable of a `for` loop, always `int`
    LoopVar { slot: u32 },
}

impl DefKind {
    /// Local slot, for parameters, locals and loop variables
    pub fn slot(&self) -> Option<(u32, Type)> {
        match *self {
            DefKind::Param { slot, ty } | DefKind::Local { slot, ty } => Some((slot, ty)),
            DefKind::LoopVar { slot } => Some((slot, Type::Int)),
            _ => None,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            DefKind::Array { .. } => "array",
            DefKind::Routine { .. } => "routine",
            DefKind::Param { .. } => "parameter",
            DefKind::Local { .. } => "local variable",
            DefKind::LoopVar { .. } => "loop variable",
        }
    }
}

/// Symbol information
#[derive(Debug, Clone)]
pub struct Symbol {
    /// Unique ID
    pub def_id: DefId,
    /// Name as string
    pub name: String,
    /// Kind of definition
    pub kind: DefKind,
    /// Original AST node
    pub node_id: NodeId,
    /// Span in source
    pub span: Span,
}

/// Scope level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Global arrays and routines
    Global,
    /// Parameters and `with` locals of one routine
    Routine,
    /// Body of a `for` loop, holding its control variable
    Loop,
}

/// A single scope
#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    /// Names defined in this scope, in declaration order
    pub names: IndexMap<String, DefId>,
}

impl Scope {
    pub fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            names: IndexMap::new(),
        }
    }
}

/// Symbol table with scoped lookups
#[derive(Debug)]
pub struct SymbolTable {
    /// All symbols, indexed by DefId
    symbols: Vec<Symbol>,
    /// Scope stack; the bottom entry is the global scope
    scopes: Vec<Scope>,
    /// NodeId -> DefId mapping (for definitions)
    node_to_def: FxHashMap<NodeId, DefId>,
    /// NodeId -> DefId mapping (for references)
    node_to_ref: FxHashMap<NodeId, DefId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            symbols: Vec::new(),
            scopes: vec![Scope::new(ScopeKind::Global)],
            node_to_def: FxHashMap::default(),
            node_to_ref: FxHashMap::default(),
        }
    }

    /// Push new scope
    pub fn push_scope(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope::new(kind));
    }

    /// Pop scope; the global scope is never popped
    pub fn pop_scope(&mut self) -> Option<Scope> {
        if self.scopes.len() > 1 {
            self.scopes.pop()
        } else {
            None
        }
    }

    /// Create a symbol and bind its name in the current scope.
    /// Fails with the existing DefId if the name is taken in this scope.
    pub fn define(
        &mut self,
        name: &str,
        kind: DefKind,
        node_id: NodeId,
        span: Span,
    ) -> Result<DefId, DefId> {
        let def_id = DefId(self.symbols.len() as u32);
        // The global scope is never popped, so `last_mut` always succeeds.
        if let Some(scope) = self.scopes.last_mut() {
            if let Some(&existing) = scope.names.get(name) {
                return Err(existing);
            }
            scope.names.insert(name.to_string(), def_id);
        }

        self.symbols.push(Symbol {
            def_id,
            name: name.to_string(),
            kind,
            node_id,
            span,
        });
        self.node_to_def.insert(node_id, def_id);
        Ok(def_id)
    }

    /// Look up a name, innermost scope first, ending at the global scope
    pub fn lookup(&self, name: &str) -> Option<DefId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.names.get(name).copied())
    }

    /// Look up a name in the routine-local scopes only
    pub fn lookup_local(&self, name: &str) -> Option<DefId> {
        self.scopes
            .iter()
            .rev()
            .take_while(|scope| scope.kind != ScopeKind::Global)
            .find_map(|scope| scope.names.get(name).copied())
    }

    /// Get symbol by DefId
    pub fn get(&self, def_id: DefId) -> Option<&Symbol> {
        self.symbols.get(def_id.0 as usize)
    }

    /// Record a reference from NodeId to DefId
    pub fn record_ref(&mut self, node_id: NodeId, def_id: DefId) {
        self.node_to_ref.insert(node_id, def_id);
    }

    /// Get DefId for a definition node
    pub fn def_for_node(&self, node_id: NodeId) -> Option<DefId> {
        self.node_to_def.get(&node_id).copied()
    }

    /// Get DefId for a reference node
    pub fn ref_for_node(&self, node_id: NodeId) -> Option<DefId> {
        self.node_to_ref.get(&node_id).copied()
    }

    /// Symbol a reference node resolved to
    pub fn resolved(&self, node_id: NodeId) -> Option<&Symbol> {
        self.ref_for_node(node_id).and_then(|id| self.get(id))
    }

    /// Global names in declaration order
    pub fn globals(&self) -> impl Iterator<Item = &Symbol> {
        self.scopes[0]
            .names
            .values()
            .filter_map(|&id| self.get(id))
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
