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

//! Dense factor tables over an ordered scope of discrete variables. All
//! entries are base-10 logarithms; probability zero is stored as -inf and
//! combination is saturating addition.

use rustc_hash::FxHashMap;

use crate::common::*;

/// A dense table over an ascending scope of variables. The table is laid
/// out row-major on the scope as listed, i.e. the last scope variable is
/// the fastest running index. Offsets (strides) per scope position are
/// precomputed at construction.
#[derive(Debug, Clone)]
pub struct Factor {
    /// Stable id of the factor in the problem
    id: usize,
    /// Scope of the factor, in ascending variable order
    scope: Vec<usize>,
    /// Domain size of each scope variable
    domains: Vec<usize>,
    /// Precomputed offsets for value lookup
    offsets: Vec<usize>,
    /// The actual table of log10 values
    table: Vec<f64>,
}

impl Factor {

    pub fn new(id: usize, scope: Vec<usize>, domains: Vec<usize>, table: Vec<f64>) -> Self {
        debug_assert!(scope.windows(2).all(|w| w[0] < w[1]), "factor scope must be ascending");
        debug_assert_eq!(scope.len(), domains.len());
        let mut offsets = vec![1; scope.len()];
        for i in (0..scope.len().saturating_sub(1)).rev() {
            offsets[i] = offsets[i + 1] * domains[i + 1];
        }
        debug_assert_eq!(table.len(), domains.iter().product::<usize>().max(1));
        Self { id, scope, domains, offsets, table }
    }

    /// Builds a factor from a table of probabilities, converting the
    /// entries to log10 (zero becomes -inf)
    pub fn from_probabilities(id: usize, scope: Vec<usize>, domains: Vec<usize>, table: Vec<f64>) -> Self {
        let table = table.iter().map(|p| p.log10()).collect();
        Self::new(id, scope, domains, table)
    }

    /// A factor with empty scope holding a single value
    pub fn constant(id: usize, value: f64) -> Self {
        Self::new(id, vec![], vec![], vec![value])
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn set_id(&mut self, id: usize) {
        self.id = id;
    }

    pub fn scope(&self) -> &[usize] {
        &self.scope
    }

    pub fn domains(&self) -> &[usize] {
        &self.domains
    }

    pub fn arity(&self) -> usize {
        self.scope.len()
    }

    pub fn table_size(&self) -> usize {
        self.table.len()
    }

    pub fn table(&self) -> &[f64] {
        &self.table
    }

    /// Returns true iff the factor is constant
    pub fn is_constant(&self) -> bool {
        self.scope.is_empty()
    }

    /// Returns true iff the variable is in the scope of the factor
    pub fn in_scope(&self, variable: usize) -> bool {
        self.scope.binary_search(&variable).is_ok()
    }

    /// Number of non-zero entries in the table
    pub fn tightness(&self) -> usize {
        self.table.iter().filter(|v| **v != ELEM_ZERO).count()
    }

    /// Returns true iff all scope variables are set in the assignment
    pub fn is_instantiated(&self, assignment: &[Value]) -> bool {
        self.scope.iter().all(|v| assignment[*v] != UNASSIGNED)
    }

    fn index_of(&self, assignment: &[Value]) -> usize {
        let mut index = 0;
        for (k, v) in self.scope.iter().enumerate() {
            debug_assert!(assignment[*v] != UNASSIGNED);
            index += assignment[*v] as usize * self.offsets[k];
        }
        index
    }

    /// Returns the table entry for a (full on the scope) assignment
    pub fn value(&self, assignment: &[Value]) -> f64 {
        self.table[self.index_of(assignment)]
    }

    /// Writes the table entries for all values of `variable` into `out`,
    /// with the remaining scope variables fixed by the assignment. This is
    /// a strided scan over the table.
    pub fn values_for(&self, variable: usize, assignment: &[Value], out: &mut [f64]) {
        let pos = self.scope.binary_search(&variable).expect("variable not in scope");
        let mut base = 0;
        for (k, v) in self.scope.iter().enumerate() {
            if k != pos {
                debug_assert!(assignment[*v] != UNASSIGNED);
                base += assignment[*v] as usize * self.offsets[k];
            }
        }
        let stride = self.offsets[pos];
        for (a, slot) in out.iter_mut().enumerate().take(self.domains[pos]) {
            *slot = self.table[base + a * stride];
        }
    }

    /// Generates a new (smaller) factor with the instantiated variables
    /// removed from the scope and the table collapsed onto the rest
    pub fn substitute(&self, assignment: &FxHashMap<usize, Value>) -> Factor {
        let mut new_scope = vec![];
        let mut new_domains = vec![];
        for (k, v) in self.scope.iter().enumerate() {
            if !assignment.contains_key(v) {
                new_scope.push(*v);
                new_domains.push(self.domains[k]);
            }
        }
        let new_size = new_domains.iter().product::<usize>().max(1);
        let mut new_table = vec![ELEM_ZERO; new_size];
        let mut values = vec![0usize; new_scope.len()];
        for entry in new_table.iter_mut() {
            let mut index = 0;
            let mut j = 0;
            for (k, v) in self.scope.iter().enumerate() {
                let val = match assignment.get(v) {
                    Some(a) => *a as usize,
                    None => {
                        j += 1;
                        values[j - 1]
                    },
                };
                index += val * self.offsets[k];
            }
            *entry = self.table[index];
            increment(&mut values, &new_domains);
        }
        Factor::new(self.id, new_scope, new_domains, new_table)
    }

    /// Renames the variables in the scope. The mapping must preserve the
    /// relative order of the scope variables.
    pub fn translate_scope(&mut self, translate: &FxHashMap<usize, usize>) {
        for v in self.scope.iter_mut() {
            *v = *translate.get(v).expect("missing variable in translation");
        }
        debug_assert!(self.scope.windows(2).all(|w| w[0] < w[1]));
    }

    /// Largest entry of the table
    pub fn max_value(&self) -> f64 {
        self.table.iter().copied().fold(ELEM_ZERO, f64::max)
    }

    /// Largest entry consistent with a partial assignment (unassigned
    /// scope variables are maximized over)
    pub fn conditioned_max(&self, assignment: &[Value]) -> f64 {
        let free: Vec<usize> = (0..self.scope.len()).filter(|k| assignment[self.scope[*k]] == UNASSIGNED).collect();
        let mut base = 0;
        for (k, v) in self.scope.iter().enumerate() {
            if assignment[*v] != UNASSIGNED {
                base += assignment[*v] as usize * self.offsets[k];
            }
        }
        let free_domains: Vec<usize> = free.iter().map(|k| self.domains[*k]).collect();
        let mut values = vec![0usize; free.len()];
        let count = free_domains.iter().product::<usize>().max(1);
        let mut best = ELEM_ZERO;
        for _ in 0..count {
            let index = base + free.iter().zip(values.iter()).map(|(k, a)| a * self.offsets[*k]).sum::<usize>();
            best = best.max(self.table[index]);
            increment(&mut values, &free_domains);
        }
        best
    }

    /// Max-marginal onto a single scope variable: one value per value of
    /// the variable, maximized over all other scope variables
    pub fn max_marginal(&self, variable: usize) -> Vec<f64> {
        let pos = self.scope.binary_search(&variable).expect("variable not in scope");
        let stride = self.offsets[pos];
        let domain = self.domains[pos];
        let mut out = vec![ELEM_ZERO; domain];
        for (i, v) in self.table.iter().enumerate() {
            let a = (i / stride) % domain;
            if *v > out[a] {
                out[a] = *v;
            }
        }
        out
    }

    /// Adds a per-value term on `variable` to every table entry
    pub fn add_unary(&mut self, variable: usize, delta: &[f64]) {
        let pos = self.scope.binary_search(&variable).expect("variable not in scope");
        let stride = self.offsets[pos];
        let domain = self.domains[pos];
        for (i, v) in self.table.iter_mut().enumerate() {
            *v += delta[(i / stride) % domain];
        }
    }

    /// Subtracts a per-value term on `variable` from every table entry,
    /// with -inf - -inf saturating to -inf
    pub fn sub_unary(&mut self, variable: usize, delta: &[f64]) {
        let pos = self.scope.binary_search(&variable).expect("variable not in scope");
        let stride = self.offsets[pos];
        let domain = self.domains[pos];
        for (i, v) in self.table.iter_mut().enumerate() {
            let d = delta[(i / stride) % domain];
            if *v == ELEM_ZERO {
                continue;
            }
            *v -= d;
        }
    }

    /// Elementwise product with a factor over the identical scope
    pub fn combine(&mut self, other: &Factor) {
        debug_assert_eq!(self.scope, other.scope);
        for (v, w) in self.table.iter_mut().zip(other.table.iter()) {
            *v += w;
        }
    }

    /// Replaces zero entries by the given log value
    pub fn perturb_zeros(&mut self, value: f64) {
        for v in self.table.iter_mut() {
            if *v == ELEM_ZERO {
                *v = value;
            }
        }
    }

    /// Combines the given factors into one over the union of their scopes
    pub fn product(id: usize, factors: &[&Factor], domains: &[usize]) -> Factor {
        let mut scope: Vec<usize> = factors.iter().flat_map(|f| f.scope.iter().copied()).collect();
        scope.sort_unstable();
        scope.dedup();
        let scope_domains: Vec<usize> = scope.iter().map(|v| domains[*v]).collect();
        let size = scope_domains.iter().product::<usize>().max(1);
        let mut table = vec![ELEM_ONE; size];
        let mut values = vec![0usize; scope.len()];
        let mut assignment = vec![UNASSIGNED; domains.len()];
        for entry in table.iter_mut() {
            for (v, a) in scope.iter().zip(values.iter()) {
                assignment[*v] = *a as Value;
            }
            for f in factors.iter() {
                *entry += f.value(&assignment);
            }
            increment(&mut values, &scope_domains);
        }
        Factor::new(id, scope, scope_domains, table)
    }

    /// Maximizes one scope variable out of the table, producing a factor
    /// over the remaining scope
    pub fn maximize_out(&self, variable: usize) -> Factor {
        let pos = self.scope.binary_search(&variable).expect("variable not in scope");
        let stride = self.offsets[pos];
        let domain = self.domains[pos];
        let mut new_scope = self.scope.clone();
        new_scope.remove(pos);
        let mut new_domains = self.domains.clone();
        new_domains.remove(pos);
        let new_size = new_domains.iter().product::<usize>().max(1);
        let mut new_table = vec![ELEM_ZERO; new_size];
        for (i, v) in self.table.iter().enumerate() {
            let high = i / (stride * domain);
            let low = i % stride;
            let target = high * stride + low;
            if *v > new_table[target] {
                new_table[target] = *v;
            }
        }
        Factor::new(self.id, new_scope, new_domains, new_table)
    }
}

/// Advances a row-major odometer over the given domains; the last position
/// runs fastest. Returns false once the odometer wraps around.
pub fn increment(values: &mut [usize], domains: &[usize]) -> bool {
    for i in (0..values.len()).rev() {
        values[i] = (values[i] + 1) % domains[i];
        if values[i] != 0 {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod test_factor {

    use super::*;
    use crate::common::*;

    fn example() -> Factor {
        // f(x0, x1) over binary domains, row-major [0.1, 0.9, 0.4, 0.2]
        Factor::from_probabilities(0, vec![0, 1], vec![2, 2], vec![0.1, 0.9, 0.4, 0.2])
    }

    #[test]
    fn evaluates_row_major() {
        let f = example();
        assert_eq!(f.value(&vec![0, 1]), 0.9f64.log10());
        assert_eq!(f.value(&vec![1, 0]), 0.4f64.log10());
    }

    #[test]
    fn values_for_scans_one_variable() {
        let f = example();
        let mut out = vec![0.0; 2];
        f.values_for(1, &vec![1, UNASSIGNED], &mut out);
        assert_eq!(out, vec![0.4f64.log10(), 0.2f64.log10()]);
        f.values_for(0, &vec![UNASSIGNED, 0], &mut out);
        assert_eq!(out, vec![0.1f64.log10(), 0.4f64.log10()]);
    }

    #[test]
    fn substitute_matches_direct_evaluation() {
        let f = example();
        let mut partial = FxHashMap::default();
        partial.insert(0usize, 1 as Value);
        let g = f.substitute(&partial);
        assert_eq!(g.scope(), &[1]);
        for a in 0..2 as Value {
            assert_eq!(g.value(&vec![0, a]), f.value(&vec![1, a]));
        }
    }

    #[test]
    fn substitute_to_constant() {
        let f = example();
        let mut full = FxHashMap::default();
        full.insert(0usize, 0 as Value);
        full.insert(1usize, 1 as Value);
        let g = f.substitute(&full);
        assert!(g.is_constant());
        assert_eq!(g.table()[0], 0.9f64.log10());
    }

    #[test]
    fn translate_identity_preserves_values() {
        let mut f = example();
        let reference = example();
        let mut id_map = FxHashMap::default();
        id_map.insert(0usize, 0usize);
        id_map.insert(1usize, 1usize);
        f.translate_scope(&id_map);
        for i in 0..2 {
            for j in 0..2 {
                assert_eq!(f.value(&vec![i, j]), reference.value(&vec![i, j]));
            }
        }
    }

    #[test]
    fn max_marginal_and_maximize_out() {
        let f = example();
        assert_eq!(f.max_marginal(0), vec![0.9f64.log10(), 0.4f64.log10()]);
        assert_eq!(f.max_marginal(1), vec![0.4f64.log10(), 0.9f64.log10()]);
        let g = f.maximize_out(0);
        assert_eq!(g.scope(), &[1]);
        assert_eq!(g.table(), &[0.4f64.log10(), 0.9f64.log10()]);
    }

    #[test]
    fn product_combines_scopes() {
        let f = Factor::from_probabilities(0, vec![0, 1], vec![2, 2], vec![0.2, 0.8, 0.6, 0.3]);
        let g = Factor::from_probabilities(1, vec![1, 2], vec![2, 2], vec![0.5, 0.5, 0.1, 0.9]);
        let p = Factor::product(2, &[&f, &g], &[2, 2, 2]);
        assert_eq!(p.scope(), &[0, 1, 2]);
        assert_eq!(p.value(&vec![0, 1, 1]), 0.8f64.log10() + 0.9f64.log10());
    }

    #[test]
    fn tightness_counts_nonzero_entries() {
        let f = Factor::from_probabilities(0, vec![0, 1], vec![2, 2], vec![1.0, 0.0, 0.0, 1.0]);
        assert_eq!(f.tightness(), 2);
    }

    #[test]
    fn conditioned_max_respects_partial_assignment() {
        let f = example();
        assert_eq!(f.conditioned_max(&vec![UNASSIGNED, UNASSIGNED]), 0.9f64.log10());
        assert_eq!(f.conditioned_max(&vec![1, UNASSIGNED]), 0.4f64.log10());
    }
}
