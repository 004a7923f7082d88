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

//! End-to-end orchestration: parse and preprocess the problem, search
//! for an elimination ordering, build the pseudo tree and the bounding
//! heuristic, then run the selected strategy until the optimum is proved
//! or the deadline passes.

use std::time::{Duration, Instant};

use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sysinfo::{System, SystemExt};

use crate::args::Args;
use crate::common::*;
use crate::core::graph::Graph;
use crate::core::problem::Problem;
use crate::heuristics::fglp_heuristic::FglpBudget;
use crate::heuristics::{FglpHeuristic, FglpMbeHeuristic, Heuristic, MiniBucketHeuristic};
use crate::order::{find_ordering, ordering_width, EliminationOrder};
use crate::parsers;
use crate::preprocess::Preprocessor;
use crate::pseudo_tree::PseudoTree;
use crate::search::aostar::AoStar;
use crate::search::bnb::BranchAndBound;
use crate::search::lds::LimitedDiscrepancy;
use crate::search::Search;

pub fn run<const S: bool>(args: &Args) -> Result<Solution, Error> {
    let start = Instant::now();
    let deadline = args.max_time().map(|t| start + Duration::from_secs(t));

    let mut problem = parsers::uai::read_uai(args.input())?;
    let evidence = match args.evidence() {
        Some(path) => parsers::read_evidence(path)?,
        None => Default::default(),
    };
    info!("read {} variables and {} factors", problem.number_variables(), problem.factors().len());

    Preprocessor::new(&mut problem).preprocess(&evidence, args.collapse(), args.perturb())?;
    info!("reduced problem has {} variables (dummy included)", problem.number_variables());

    let real_vars = problem.number_variables() - 1;
    let graph = Graph::from_factors(real_vars, problem.factors());

    let order = find_elimination_order(args, &graph, real_vars)?;
    info!("elimination ordering of width {}", order.width());

    let mut pt = PseudoTree::build(&graph, &order, args.cache_bound(), args.or_chain());
    pt.assign_functions(problem.factors());
    info!("pseudo tree: height {}, {} components", pt.height(), pt.components());

    let memory_limit = match args.memory() {
        Some(m) => m,
        None => {
            let system = System::new_all();
            system.total_memory() / 1_000_000
        },
    };

    // the heuristic is built on the unrestricted tree; its bounds stay
    // valid for any conditioned subproblem
    let mut heuristic = make_heuristic(args);
    let adjusted = heuristic.size_limit(&problem, &pt, memory_limit);
    if adjusted > 0 && adjusted < args.i_bound() {
        warn!("i-bound lowered to {} to fit {} MB", adjusted, memory_limit);
    }
    let upper_bound = heuristic.build(&problem, &pt)?;
    info!("heuristic upper bound {:.8}", upper_bound);

    let subproblem = match args.subproblem() {
        Some(path) => {
            let spec = parsers::read_subproblem(path)?;
            if spec.root_var >= real_vars {
                return Err(Error::MalformedInput(format!("subproblem root {} out of range", spec.root_var)));
            }
            if spec.context_values.len() != pt.node(spec.root_var).full_context().len() {
                return Err(Error::MalformedInput("subproblem context size does not match".to_string()));
            }
            pt.restrict_subproblem(spec.root_var);
            Some(spec)
        },
        None => None,
    };

    // an optional discrepancy-bounded pass for an initial lower bound
    let mut seed_bound: Option<(f64, Vec<Value>)> = None;
    if args.lds().is_some() && subproblem.is_some() {
        warn!("lds is skipped for restricted subproblems");
    }
    if let (Some(discrepancy), None) = (args.lds(), &subproblem) {
        let mut lds = LimitedDiscrepancy::new(Search::<S>::new(&problem, &pt, false, heuristic));
        seed_bound = lds.solve(discrepancy, deadline);
        if let Some((bound, _)) = &seed_bound {
            info!("lds bound {:.8}", bound);
        }
        heuristic = lds.search.into_heuristic();
    }

    let mut search = Search::<S>::new(&problem, &pt, !args.nocaching(), heuristic);
    match &subproblem {
        Some(spec) => {
            let context: Vec<(usize, Value)> = pt.node(spec.root_var).full_context().iter().copied()
                .zip(spec.context_values.iter().copied())
                .collect();
            for (var, value) in context.iter() {
                if *value < 0 || *value as usize >= problem.domain_size(*var) {
                    return Err(Error::DomainViolation(format!("subproblem context value {} for variable {}", value, var)));
                }
            }
            search.install_subproblem(spec.root_var, &context, &spec.pst);
        },
        None => {
            search.init();
        },
    }
    search.finalize_heuristic();

    if let Some(path) = args.initial_bound() {
        let (bound, assignment) = parsers::read_initial_bound(path)?;
        let reduced = assignment.map(|full| reduce_assignment(&problem, &full));
        search.update_solution(bound, reduced);
        info!("seeded initial bound {:.8}", bound);
    }
    if let Some((bound, tuple)) = seed_bound {
        search.update_solution(bound, Some(tuple));
    }

    let algorithm = if subproblem.is_some() && args.algorithm() == Algorithm::AoStar {
        warn!("subproblem restriction runs with branch-and-bound");
        Algorithm::Bnb
    } else {
        args.algorithm()
    };

    let (space, stats_line, completed) = match algorithm {
        Algorithm::Bnb => {
            let mut bnb = BranchAndBound::new(search, args.rotate(), args.rotate_limit());
            bnb.reset(None);
            let completed = bnb.solve(deadline, memory_limit);
            let stats = format!("{}", bnb.search.stats);
            (bnb.search.space, stats, completed)
        },
        Algorithm::AoStar => {
            let mut aostar = AoStar::new(search);
            let completed = aostar.solve(deadline);
            let stats = format!("{}", aostar.search.stats);
            (aostar.search.space, stats, completed)
        },
    };

    if S {
        println!("{}", stats_line);
    }

    let incumbent = &space.incumbent;
    let root_var = match &subproblem {
        Some(spec) => spec.root_var,
        None => pt.root(),
    };
    let mut full = vec![UNASSIGNED; problem.number_variables()];
    if let Some(spec) = &subproblem {
        for (var, value) in pt.node(spec.root_var).full_context().iter().zip(spec.context_values.iter()) {
            full[*var] = *value;
        }
    }
    let sub_vars = pt.node(root_var).sub_vars();
    for (i, var) in sub_vars.iter().enumerate() {
        if i < incumbent.assignment.len() {
            full[*var] = incumbent.assignment[i];
        }
    }

    let solution = Solution::new(incumbent.value, problem.assignment_for_output(&full), incumbent.time_found);
    if completed {
        info!("search space exhausted, the incumbent is optimal");
    }
    if let Some(path) = args.sol_file() {
        parsers::write_solution(path, solution.assignment())?;
    }
    Ok(solution)
}

/// Iterated randomized min-fill, optionally seeded from an ordering
/// file; each restart aborts as soon as it exceeds the best width so far
fn find_elimination_order(args: &Args, graph: &Graph, n: usize) -> Result<EliminationOrder, Error> {
    let hard_limit = args.max_width().unwrap_or(usize::MAX);
    let mut best: Option<EliminationOrder> = match args.ordering() {
        Some(path) => {
            let order = parsers::read_ordering(path, n)?;
            let width = ordering_width(graph, &order);
            Some(EliminationOrder::new(order, width))
        },
        None => None,
    };

    let mut rng = match args.seed() {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let budget = args.order_time().map(|t| Instant::now() + Duration::from_secs(t));
    for _ in 0..args.order_iter() {
        if let Some(budget) = budget {
            if Instant::now() >= budget {
                break;
            }
        }
        let limit = match &best {
            Some(b) => b.width().saturating_sub(1).min(hard_limit),
            None => hard_limit,
        };
        if let Some(order) = find_ordering(graph, limit, args.order_tolerance(), &mut rng) {
            if best.as_ref().map(|b| order.width() < b.width()).unwrap_or(true) {
                best = Some(order);
            }
        }
    }

    match best {
        Some(order) if order.width() <= hard_limit => Ok(order),
        Some(order) => Err(Error::WidthExceeded { width: order.width(), limit: hard_limit }),
        None => {
            // measure the width once without the cap for the report
            let width = find_ordering(graph, usize::MAX, args.order_tolerance(), &mut rng)
                .map(|order| order.width())
                .unwrap_or(0);
            Err(Error::WidthExceeded { width, limit: hard_limit })
        },
    }
}

/// Drops the eliminated original variables from a full assignment and
/// appends the dummy, yielding the root solution tuple
fn reduce_assignment(problem: &Problem, full: &[Value]) -> Vec<Value> {
    let mut reduced = vec![UNASSIGNED; problem.number_variables()];
    for (original, value) in full.iter().enumerate() {
        if original >= problem.number_variables_original() {
            break;
        }
        if problem.is_eliminated(original) {
            continue;
        }
        if let Some(new) = problem.old_to_new().get(&original) {
            reduced[*new] = *value;
        }
    }
    reduced[problem.number_variables() - 1] = 0;
    reduced
}

fn make_heuristic(args: &Args) -> Box<dyn Heuristic> {
    let budget = FglpBudget {
        root_iters: args.mplp(),
        root_time: args.mplps(),
        root_tolerance: args.mplpt(),
        node_iters: args.ndfglp(),
        node_time: args.ndfglps(),
        node_tolerance: args.ndfglpt(),
    };
    match args.heuristic() {
        HeuristicChoice::MiniBucket => {
            Box::new(MiniBucketHeuristic::new(args.i_bound(), args.moment_matching()))
        },
        HeuristicChoice::Fglp => {
            Box::new(FglpHeuristic::new(budget, args.use_priority(), args.use_nullary_shift(), args.use_shifted_labels()))
        },
        HeuristicChoice::FglpMbe => {
            Box::new(FglpMbeHeuristic::new(
                budget,
                args.i_bound(),
                args.moment_matching(),
                args.use_priority(),
                args.use_nullary_shift(),
                args.use_shifted_labels(),
            ))
        },
    }
}
