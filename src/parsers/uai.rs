use std::fs;
use std::path::Path;

use crate::common::*;
use crate::core::factor::{increment, Factor};
use crate::core::problem::Problem;
use crate::parsers::Tokens;

/// Parses a UAI-style network file: the problem class header, variable
/// count and domain sizes, the factor scopes, and the tables in
/// row-major order on their scopes. The engine treats MARKOV and BAYES
/// identically (max-product); tables are converted to log10 on the fly
/// and scopes are normalized to ascending variable order.
pub fn read_uai(path: &Path) -> Result<Problem, Error> {
    let content = fs::read_to_string(path)?;
    let mut tokens = Tokens::new(&content);

    let class = match tokens.next_str()?.to_ascii_uppercase().as_str() {
        "MARKOV" => ProblemClass::Markov,
        "BAYES" => ProblemClass::Bayes,
        other => return Err(Error::MalformedInput(format!("unknown problem class '{}'", other))),
    };

    let n = tokens.next_usize()?;
    let mut domains = Vec::with_capacity(n);
    for _ in 0..n {
        let size = tokens.next_usize()?;
        if size == 0 {
            return Err(Error::MalformedInput("variable with empty domain".to_string()));
        }
        domains.push(size);
    }

    let number_factors = tokens.next_usize()?;
    let mut scopes: Vec<Vec<usize>> = Vec::with_capacity(number_factors);
    for _ in 0..number_factors {
        let arity = tokens.next_usize()?;
        let mut scope = Vec::with_capacity(arity);
        for _ in 0..arity {
            let var = tokens.next_usize()?;
            if var >= n {
                return Err(Error::DomainViolation(format!("scope index {} out of range", var)));
            }
            if scope.contains(&var) {
                return Err(Error::MalformedInput(format!("variable {} repeated in a scope", var)));
            }
            scope.push(var);
        }
        scopes.push(scope);
    }

    let mut factors = Vec::with_capacity(number_factors);
    for (id, scope) in scopes.into_iter().enumerate() {
        let declared = tokens.next_usize()?;
        let expected = scope.iter().map(|v| domains[*v]).product::<usize>().max(1);
        if declared != expected {
            return Err(Error::MalformedInput(format!(
                "factor {} declares {} entries but its scope has {}", id, declared, expected
            )));
        }
        let mut table = Vec::with_capacity(declared);
        for _ in 0..declared {
            let p = tokens.next_f64()?;
            if p < 0.0 {
                return Err(Error::MalformedInput(format!("negative entry in factor {}", id)));
            }
            table.push(p);
        }
        factors.push(normalized_factor(id, scope, &domains, table));
    }

    Ok(Problem::new(class, domains, factors))
}

/// Reorders a table given on an arbitrary scope permutation into the
/// ascending-scope row-major layout
fn normalized_factor(id: usize, scope: Vec<usize>, domains: &[usize], table: Vec<f64>) -> Factor {
    let mut sorted_scope = scope.clone();
    sorted_scope.sort_unstable();
    let scope_domains: Vec<usize> = scope.iter().map(|v| domains[*v]).collect();
    let sorted_domains: Vec<usize> = sorted_scope.iter().map(|v| domains[*v]).collect();

    if sorted_scope == scope {
        return Factor::from_probabilities(id, sorted_scope, sorted_domains, table);
    }

    // strides of the ascending layout, per original scope position
    let mut offsets = vec![1usize; sorted_scope.len()];
    for i in (0..sorted_scope.len().saturating_sub(1)).rev() {
        offsets[i] = offsets[i + 1] * sorted_domains[i + 1];
    }
    let position: Vec<usize> = scope.iter().map(|v| sorted_scope.binary_search(v).unwrap()).collect();

    let mut sorted_table = vec![0.0; table.len()];
    let mut values = vec![0usize; scope.len()];
    for entry in table.iter() {
        let index: usize = values.iter().zip(position.iter()).map(|(a, p)| a * offsets[*p]).sum();
        sorted_table[index] = *entry;
        increment(&mut values, &scope_domains);
    }
    Factor::from_probabilities(id, sorted_scope, sorted_domains, sorted_table)
}

#[cfg(test)]
mod test_uai {

    use super::*;
    use std::io::Write;

    fn parse(content: &str) -> Result<Problem, Error> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        read_uai(file.path())
    }

    #[test]
    fn reads_a_small_markov_network() {
        let problem = parse("MARKOV\n2\n2 2\n1\n2 0 1\n4\n0.1 0.9 0.4 0.2\n").unwrap();
        assert_eq!(problem.number_variables(), 2);
        assert_eq!(problem.factors().len(), 1);
        assert_eq!(problem.factors()[0].value(&vec![0, 1]), 0.9f64.log10());
    }

    #[test]
    fn normalizes_reversed_scopes() {
        // the same table declared on scope (1, 0): rows now range over x1
        let problem = parse("MARKOV\n2\n2 2\n1\n2 1 0\n4\n0.1 0.9 0.4 0.2\n").unwrap();
        let factor = &problem.factors()[0];
        assert_eq!(factor.scope(), &[0, 1]);
        // entry (x1=0, x0=1) in file order is 0.9
        assert_eq!(factor.value(&vec![1, 0]), 0.9f64.log10());
    }

    #[test]
    fn rejects_wrong_table_size() {
        assert!(parse("MARKOV\n2\n2 2\n1\n2 0 1\n3\n0.1 0.9 0.4\n").is_err());
    }

    #[test]
    fn rejects_scope_index_out_of_range() {
        assert!(matches!(
            parse("MARKOV\n2\n2 2\n1\n2 0 5\n4\n0.1 0.9 0.4 0.2\n"),
            Err(Error::DomainViolation(_))
        ));
    }
}
