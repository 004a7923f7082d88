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

//! Exact MPE/MAP inference in discrete graphical models by AND/OR
//! branch-and-bound (or best-first AO*) search over a pseudo tree, with
//! context-based caching and mini-bucket / FGLP upper bounds.

pub mod args;
pub mod common;
pub mod core;
pub mod heuristics;
pub mod order;
pub mod parsers;
pub mod preprocess;
pub mod propagator;
pub mod pseudo_tree;
pub mod search;
pub mod solver;
pub mod statistics;

pub use args::Args;
pub use common::{Algorithm, Error, HeuristicChoice, Solution};

use peak_alloc::PeakAlloc;

#[global_allocator]
pub static PEAK_ALLOC: PeakAlloc = PeakAlloc;

/// Solves the problem described by the arguments and returns the best
/// solution found (optimal unless a deadline cut the search short)
pub fn solve(args: &Args) -> Result<Solution, Error> {
    if args.statistics() {
        solver::run::<true>(args)
    } else {
        solver::run::<false>(args)
    }
}
