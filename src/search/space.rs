//Aobb
//Copyright (C) 2023-2025 the aobb developers
//
//This program is free software: you can redistribute it and/or modify
//it under the terms of the GNU Affero General Public License as published by
//the Free Software Foundation, either version 3 of the License, or
//(at your option) any later version.
//
//This program is distributed in the hope that it will be useful,
//but WITHOUT ANY WARRANTY; without even the implied warranty of
//MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//GNU Affero General Public License for more details.
//
//You should have received a copy of the GNU Affero General Public License
//along with this program.  If not, see <http://www.gnu.org/licenses/>.

use rustc_hash::FxHashMap;

use crate::common::*;
use crate::search::node::{NodeArena, NodeIndex};

/// A solved subproblem value committed by the propagator, together with
/// the assignment of the subtree variables that achieves it
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: f64,
    pub assignment: Vec<Value>,
}

/// One table per variable, keyed by the assignment of the variable's
/// cache context. Adaptive caching resets individual tables when their
/// designated ancestor branch is re-entered.
pub struct CacheTable {
    tables: Vec<FxHashMap<Vec<Value>, CacheEntry>>,
    enabled: bool,
}

impl CacheTable {

    pub fn new(n: usize, enabled: bool) -> Self {
        Self {
            tables: (0..n).map(|_| FxHashMap::default()).collect(),
            enabled,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn read(&self, var: usize, signature: &[Value]) -> Option<&CacheEntry> {
        if !self.enabled {
            return None;
        }
        self.tables[var].get(signature)
    }

    pub fn write(&mut self, var: usize, signature: Vec<Value>, entry: CacheEntry) {
        if !self.enabled {
            return;
        }
        self.tables[var].insert(signature, entry);
    }

    /// Drops every entry of one variable (adaptive-cache reset)
    pub fn reset(&mut self, var: usize) {
        self.tables[var].clear();
    }

    /// Drops everything, used under memory pressure
    pub fn clear_all(&mut self) {
        for table in self.tables.iter_mut() {
            table.clear();
        }
    }

    pub fn number_entries(&self) -> usize {
        self.tables.iter().map(|t| t.len()).sum()
    }
}

/// The best full solution seen so far, in search-space variables
#[derive(Debug, Clone)]
pub struct Incumbent {
    pub value: f64,
    pub assignment: Vec<Value>,
    pub time_found: u64,
}

impl Incumbent {
    pub fn empty() -> Self {
        Self { value: f64::NAN, assignment: vec![], time_found: 0 }
    }
}

/// Shared state of one search run: the explicated AND/OR space, the
/// context cache and the incumbent. Owned by the driver; the propagator
/// is the only writer of cache and incumbent.
pub struct SearchSpace {
    pub nodes: NodeArena,
    pub root: Option<NodeIndex>,
    /// The OR node of the subproblem root when restricted, below the
    /// chain of dummy nodes holding the parent partial solution tree
    pub subproblem_local: Option<NodeIndex>,
    pub cache: CacheTable,
    pub incumbent: Incumbent,
}

impl SearchSpace {

    pub fn new(n: usize, caching: bool) -> Self {
        Self {
            nodes: NodeArena::new(),
            root: None,
            subproblem_local: None,
            cache: CacheTable::new(n, caching),
            incumbent: Incumbent::empty(),
        }
    }

    /// The root of the actual problem, skipping the dummy partial
    /// solution tree of a restricted subproblem
    pub fn true_root(&self) -> Option<NodeIndex> {
        self.subproblem_local.or(self.root)
    }
}
