#![allow(non_snake_case)]
use std::io::Write;
use std::path::PathBuf;

use assert_float_eq::*;
use paste::paste;
use tempfile::NamedTempFile;

use aobb::{solve, Algorithm, Args, HeuristicChoice};

const SINGLE_FACTOR: &str = "MARKOV\n2\n2 2\n1\n2 0 1\n4\n0.1 0.9 0.4 0.2\n";
const CHAIN: &str = "MARKOV\n3\n2 2 2\n2\n2 0 1\n2 1 2\n4\n0.2 0.8 0.6 0.3\n4\n0.5 0.5 0.1 0.9\n";
const DETERMINISTIC: &str = "MARKOV\n2\n2 2\n1\n2 0 1\n4\n1 0 0 1\n";
const DISJOINT: &str = "MARKOV\n4\n2 2 2 2\n2\n2 0 1\n2 2 3\n4\n0.1 0.9 0.4 0.2\n4\n0.1 0.9 0.4 0.2\n";

fn instance_file(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".uai").tempfile().unwrap();
    write!(file, "{}", content).unwrap();
    file
}

fn args_for(instance: &NamedTempFile) -> Args {
    let mut args = Args::default();
    args.set_input(PathBuf::from(instance.path()));
    args.set_seed(Some(42));
    args
}

macro_rules! scenario_tests {
    ($name:ident, $configure:expr) => {
        paste! {
            #[test]
            fn [<single_factor_ $name>]() {
                let instance = instance_file(SINGLE_FACTOR);
                let mut args = args_for(&instance);
                ($configure)(&mut args);
                let solution = solve(&args).unwrap();
                assert_float_relative_eq!(solution.probability(), 0.9, 1e-6);
                assert_eq!(solution.assignment(), &[0, 1]);
            }

            #[test]
            fn [<chain_ $name>]() {
                let instance = instance_file(CHAIN);
                let mut args = args_for(&instance);
                ($configure)(&mut args);
                let solution = solve(&args).unwrap();
                assert_float_relative_eq!(solution.probability(), 0.72, 1e-6);
                assert_eq!(solution.assignment(), &[0, 1, 1]);
            }

            #[test]
            fn [<chain_with_evidence_ $name>]() {
                let instance = instance_file(CHAIN);
                let mut evidence = NamedTempFile::new().unwrap();
                write!(evidence, "1 2 0").unwrap();
                let mut args = args_for(&instance);
                args.set_evidence(Some(PathBuf::from(evidence.path())));
                ($configure)(&mut args);
                let solution = solve(&args).unwrap();
                // with x2 = 0 the best completion is (1, 0, 0), worth 0.6 * 0.5
                assert_float_relative_eq!(solution.probability(), 0.3, 1e-6);
                assert_eq!(solution.assignment(), &[1, 0, 0]);
            }

            #[test]
            fn [<deterministic_ties_ $name>]() {
                let instance = instance_file(DETERMINISTIC);
                let mut args = args_for(&instance);
                ($configure)(&mut args);
                let solution = solve(&args).unwrap();
                assert_float_relative_eq!(solution.probability(), 1.0, 1e-6);
                let assignment = solution.assignment();
                assert!(assignment == &[0, 0] || assignment == &[1, 1]);
            }

            #[test]
            fn [<disjoint_components_ $name>]() {
                let instance = instance_file(DISJOINT);
                let mut args = args_for(&instance);
                ($configure)(&mut args);
                let solution = solve(&args).unwrap();
                assert_float_relative_eq!(solution.probability(), 0.81, 1e-6);
                assert_eq!(solution.assignment(), &[0, 1, 0, 1]);
            }
        }
    }
}

scenario_tests!(bnb, |_args: &mut Args| {});
scenario_tests!(bnb_mm, |args: &mut Args| {
    args.set_moment_matching(true);
    args.set_i_bound(2);
});
scenario_tests!(bnb_small_i_bound, |args: &mut Args| {
    args.set_i_bound(1);
});
scenario_tests!(bnb_fglp, |args: &mut Args| {
    args.set_heuristic(HeuristicChoice::Fglp);
    args.set_use_shifted_labels(true);
    args.set_use_nullary_shift(true);
});
scenario_tests!(bnb_fglp_plain, |args: &mut Args| {
    args.set_heuristic(HeuristicChoice::Fglp);
});
scenario_tests!(bnb_fglp_priority, |args: &mut Args| {
    args.set_heuristic(HeuristicChoice::Fglp);
    args.set_use_priority(true);
    args.set_use_nullary_shift(true);
});
scenario_tests!(bnb_fglp_conditioned, |args: &mut Args| {
    args.set_heuristic(HeuristicChoice::Fglp);
    args.set_use_shifted_labels(true);
    args.set_ndfglp(5);
});
scenario_tests!(bnb_fglp_mbe, |args: &mut Args| {
    args.set_heuristic(HeuristicChoice::FglpMbe);
    args.set_use_shifted_labels(true);
});
scenario_tests!(aostar, |args: &mut Args| {
    args.set_algorithm(Algorithm::AoStar);
});
scenario_tests!(aostar_fglp, |args: &mut Args| {
    args.set_algorithm(Algorithm::AoStar);
    args.set_heuristic(HeuristicChoice::Fglp);
    args.set_use_shifted_labels(true);
});
scenario_tests!(or_chain, |args: &mut Args| {
    args.set_or_chain(true);
});
scenario_tests!(rotate, |args: &mut Args| {
    args.set_rotate(true);
    args.set_rotate_limit(1);
});
scenario_tests!(nocaching, |args: &mut Args| {
    args.set_nocaching(true);
});
scenario_tests!(cache_bound_one, |args: &mut Args| {
    args.set_cache_bound(Some(1));
});
scenario_tests!(lds_seeded, |args: &mut Args| {
    args.set_lds(Some(1));
});
scenario_tests!(collapse, |args: &mut Args| {
    args.set_collapse(true);
});

#[test]
fn zero_time_budget_returns_immediately() {
    let instance = instance_file(CHAIN);
    let mut args = args_for(&instance);
    args.set_max_time(Some(0));
    let solution = solve(&args).unwrap();
    assert!(solution.cost().is_nan());
    assert!(!solution.is_complete());
}

#[test]
fn solving_twice_is_idempotent() {
    let instance = instance_file(CHAIN);
    let args = args_for(&instance);
    let first = solve(&args).unwrap();
    let second = solve(&args).unwrap();
    assert_float_relative_eq!(first.probability(), second.probability(), 1e-9);
    assert_eq!(first.assignment(), second.assignment());
}

#[test]
fn solution_file_has_the_mpe_header() {
    let instance = instance_file(CHAIN);
    let out = NamedTempFile::new().unwrap();
    let mut args = args_for(&instance);
    args.set_sol_file(Some(PathBuf::from(out.path())));
    solve(&args).unwrap();
    let content = std::fs::read_to_string(out.path()).unwrap();
    assert_eq!(content, "MPE\n3 0 1 1\n");
}

#[test]
fn malformed_input_is_rejected() {
    let instance = instance_file("MARKOV\n2\n2 2\n1\n2 0 1\n3\n0.1 0.9 0.4\n");
    let args = args_for(&instance);
    assert!(solve(&args).is_err());
}

#[test]
fn width_cap_aborts_before_search() {
    // a 4-clique has induced width 3
    let instance = instance_file("MARKOV\n4\n2 2 2 2\n1\n4 0 1 2 3\n16\n1 1 1 1 1 1 1 1 1 1 1 1 1 1 1 1\n");
    let mut args = args_for(&instance);
    args.set_max_width(Some(2));
    assert!(matches!(solve(&args), Err(aobb::Error::WidthExceeded { .. })));
}

#[test]
fn initial_bound_file_seeds_the_incumbent() {
    let instance = instance_file(CHAIN);
    let mut bound_file = NamedTempFile::new().unwrap();
    bound_file.write_all(&0.5f64.log10().to_le_bytes()).unwrap();
    let mut args = args_for(&instance);
    args.set_initial_bound(Some(PathBuf::from(bound_file.path())));
    let solution = solve(&args).unwrap();
    // the seeded bound is below the optimum and gets superseded
    assert_float_relative_eq!(solution.probability(), 0.72, 1e-6);
    assert_eq!(solution.assignment(), &[0, 1, 1]);
}

#[test]
fn subproblem_restriction_solves_the_conditioned_subtree() {
    // min-fill on the chain eliminates the simplicial endpoints first, so
    // variable 0 hangs below variable 1 with context {1}
    let instance = instance_file(CHAIN);
    let mut spec = NamedTempFile::new().unwrap();
    spec.write_all(&0i32.to_le_bytes()).unwrap(); // root variable
    spec.write_all(&1i32.to_le_bytes()).unwrap(); // context length
    spec.write_all(&1i32.to_le_bytes()).unwrap(); // x1 = 1
    spec.write_all(&0i32.to_le_bytes()).unwrap(); // empty parent PST
    let mut args = args_for(&instance);
    args.set_subproblem(Some(PathBuf::from(spec.path())));
    let solution = solve(&args).unwrap();
    // best completion of x0 given x1 = 1 is x0 = 0, worth 0.8
    assert_float_relative_eq!(solution.probability(), 0.8, 1e-6);
    assert_eq!(solution.assignment(), &[0, 1, 0]);
}

#[test]
fn zero_probability_evidence_gives_zero_optimum() {
    let instance = instance_file("MARKOV\n2\n2 2\n1\n2 0 1\n4\n0 0 0.4 0.2\n");
    let mut evidence = NamedTempFile::new().unwrap();
    write!(evidence, "1 0 0").unwrap();
    let mut args = args_for(&instance);
    args.set_evidence(Some(PathBuf::from(evidence.path())));
    let solution = solve(&args).unwrap();
    assert_eq!(solution.probability(), 0.0);
}

/// Deterministic pseudo-random tables for the grid test
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 33) as f64) / (u32::MAX as f64 * 2.0) + 0.05
    }
}

/// A 3x3 grid MRF with pairwise factors: large enough for caching and
/// decomposition to matter, small enough to brute force
fn grid_instance() -> (String, Vec<Vec<f64>>, Vec<(usize, usize)>) {
    let mut scopes: Vec<(usize, usize)> = vec![];
    for row in 0..3 {
        for col in 0..3 {
            let v = row * 3 + col;
            if col + 1 < 3 {
                scopes.push((v, v + 1));
            }
            if row + 1 < 3 {
                scopes.push((v, v + 3));
            }
        }
    }
    let mut rng = Lcg(2024);
    let tables: Vec<Vec<f64>> = scopes.iter().map(|_| (0..4).map(|_| rng.next()).collect()).collect();
    let mut content = String::from("MARKOV\n9\n2 2 2 2 2 2 2 2 2\n");
    content.push_str(&format!("{}\n", scopes.len()));
    for (a, b) in scopes.iter() {
        content.push_str(&format!("2 {} {}\n", a, b));
    }
    for table in tables.iter() {
        content.push_str(&format!("4\n{} {} {} {}\n", table[0], table[1], table[2], table[3]));
    }
    (content, tables, scopes)
}

fn grid_brute_force(tables: &[Vec<f64>], scopes: &[(usize, usize)]) -> f64 {
    let mut best = 0.0f64;
    for mask in 0..(1usize << 9) {
        let value_of = |v: usize| (mask >> v) & 1;
        let mut product = 1.0;
        for (table, (a, b)) in tables.iter().zip(scopes.iter()) {
            product *= table[value_of(*a) * 2 + value_of(*b)];
        }
        best = best.max(product);
    }
    best
}

macro_rules! grid_tests {
    ($name:ident, $configure:expr) => {
        paste! {
            #[test]
            fn [<grid_ $name>]() {
                let (content, tables, scopes) = grid_instance();
                let expected = grid_brute_force(&tables, &scopes);
                let instance = instance_file(&content);
                let mut args = args_for(&instance);
                ($configure)(&mut args);
                let solution = solve(&args).unwrap();
                assert_float_relative_eq!(solution.probability(), expected, 1e-6);
                // the reported assignment must achieve the reported value
                let mut product = 1.0;
                for (table, (a, b)) in tables.iter().zip(scopes.iter()) {
                    let av = solution.assignment()[*a] as usize;
                    let bv = solution.assignment()[*b] as usize;
                    product *= table[av * 2 + bv];
                }
                assert_float_relative_eq!(product, expected, 1e-6);
            }
        }
    }
}

grid_tests!(bnb, |_args: &mut Args| {});
grid_tests!(bnb_weak_bound, |args: &mut Args| {
    args.set_i_bound(1);
});
grid_tests!(bnb_mm, |args: &mut Args| {
    args.set_i_bound(2);
    args.set_moment_matching(true);
});
grid_tests!(bnb_cache_bound, |args: &mut Args| {
    args.set_cache_bound(Some(1));
});
grid_tests!(bnb_nocaching, |args: &mut Args| {
    args.set_nocaching(true);
});
grid_tests!(bnb_or_chain, |args: &mut Args| {
    args.set_or_chain(true);
});
grid_tests!(bnb_rotate, |args: &mut Args| {
    args.set_rotate(true);
    args.set_rotate_limit(3);
});
grid_tests!(bnb_fglp, |args: &mut Args| {
    args.set_heuristic(HeuristicChoice::Fglp);
    args.set_use_shifted_labels(true);
    args.set_use_nullary_shift(true);
});
grid_tests!(bnb_fglp_mbe, |args: &mut Args| {
    args.set_heuristic(HeuristicChoice::FglpMbe);
    args.set_use_shifted_labels(true);
});
grid_tests!(aostar, |args: &mut Args| {
    args.set_algorithm(Algorithm::AoStar);
});
grid_tests!(lds_seeded, |args: &mut Args| {
    args.set_lds(Some(2));
});
