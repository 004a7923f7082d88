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

use std::fmt;

/// Implements a bunch of statistics that are collected during the search.
/// The counters are compiled out when B is false.
#[derive(Default)]
pub struct Statistics<const B: bool> {
    expanded_or: usize,
    expanded_and: usize,
    processed_or: usize,
    processed_and: usize,
    leaves: usize,
    pruned: usize,
    dead_ends: usize,
    cache_access: usize,
    cache_hit: usize,
}

impl<const B: bool> Statistics<B> {

    pub fn expand_or(&mut self) {
        if B {
            self.expanded_or += 1;
        }
    }

    pub fn expand_and(&mut self) {
        if B {
            self.expanded_and += 1;
        }
    }

    pub fn process_or(&mut self) {
        if B {
            self.processed_or += 1;
        }
    }

    pub fn process_and(&mut self) {
        if B {
            self.processed_and += 1;
        }
    }

    pub fn leaf(&mut self) {
        if B {
            self.leaves += 1;
        }
    }

    pub fn pruned(&mut self) {
        if B {
            self.pruned += 1;
        }
    }

    pub fn dead_end(&mut self) {
        if B {
            self.dead_ends += 1;
        }
    }

    pub fn cache_access(&mut self) {
        if B {
            self.cache_access += 1;
        }
    }

    pub fn cache_hit(&mut self) {
        if B {
            self.cache_hit += 1;
        }
    }

    pub fn number_expanded_or(&self) -> usize {
        self.expanded_or
    }

    pub fn number_expanded_and(&self) -> usize {
        self.expanded_and
    }

    pub fn number_expanded(&self) -> usize {
        self.expanded_or + self.expanded_and
    }
}

impl<const B: bool> fmt::Display for Statistics<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if B {
            writeln!(f, "Statistics on the search:")?;
            writeln!(f, "\tOR nodes expanded: {}", self.expanded_or)?;
            writeln!(f, "\tAND nodes expanded: {}", self.expanded_and)?;
            writeln!(f, "\tOR nodes processed: {}", self.processed_or)?;
            writeln!(f, "\tAND nodes processed: {}", self.processed_and)?;
            writeln!(f, "\tLeaf nodes: {}", self.leaves)?;
            writeln!(f, "\tPruned nodes: {}", self.pruned)?;
            writeln!(f, "\tDead-end nodes: {}", self.dead_ends)?;
            writeln!(f, "\tCache accesses: {}", self.cache_access)?;
            write!(
                f,
                "\tCache hits: {} ({:.3} %)",
                self.cache_hit,
                (self.cache_hit as f64 / self.cache_access as f64) * 100.0
            )
        } else {
            write!(f, "")
        }
    }
}
