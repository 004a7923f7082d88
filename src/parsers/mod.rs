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

pub mod uai;

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use rustc_hash::FxHashMap;

use crate::common::*;

/// Whitespace token scanner over the full file content
pub(crate) struct Tokens<'a> {
    iter: std::str::SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {

    pub fn new(content: &'a str) -> Self {
        Self { iter: content.split_whitespace() }
    }

    pub fn next_str(&mut self) -> Result<&'a str, Error> {
        self.iter.next().ok_or_else(|| Error::MalformedInput("unexpected end of file".to_string()))
    }

    pub fn next_usize(&mut self) -> Result<usize, Error> {
        let token = self.next_str()?;
        token.parse::<usize>().map_err(|_| Error::MalformedInput(format!("expected an integer, found '{}'", token)))
    }

    pub fn next_f64(&mut self) -> Result<f64, Error> {
        let token = self.next_str()?;
        token.parse::<f64>().map_err(|_| Error::MalformedInput(format!("expected a number, found '{}'", token)))
    }
}

/// Evidence file: the number of evidence variables followed by
/// (variable, value) pairs
pub fn read_evidence(path: &Path) -> Result<FxHashMap<usize, Value>, Error> {
    let content = fs::read_to_string(path)?;
    let mut tokens = Tokens::new(&content);
    let count = tokens.next_usize()?;
    let mut evidence = FxHashMap::default();
    for _ in 0..count {
        let var = tokens.next_usize()?;
        let value = tokens.next_usize()?;
        evidence.insert(var, value as Value);
    }
    Ok(evidence)
}

/// Ordering file: the length followed by a permutation of [0, n); the
/// dummy variable is implicit at the end
pub fn read_ordering(path: &Path, n: usize) -> Result<Vec<usize>, Error> {
    let content = fs::read_to_string(path)?;
    let mut tokens = Tokens::new(&content);
    let length = tokens.next_usize()?;
    if length != n {
        return Err(Error::MalformedInput(format!("ordering of length {} for {} variables", length, n)));
    }
    let mut order = Vec::with_capacity(n);
    let mut seen = vec![false; n];
    for _ in 0..n {
        let var = tokens.next_usize()?;
        if var >= n || seen[var] {
            return Err(Error::MalformedInput(format!("ordering is not a permutation (variable {})", var)));
        }
        seen[var] = true;
        order.push(var);
    }
    Ok(order)
}

fn read_f64_le(file: &mut File) -> Result<f64, Error> {
    let mut buffer = [0u8; 8];
    file.read_exact(&mut buffer)?;
    Ok(f64::from_le_bytes(buffer))
}

fn read_i32_le(file: &mut File) -> Result<i32, Error> {
    let mut buffer = [0u8; 4];
    file.read_exact(&mut buffer)?;
    Ok(i32::from_le_bytes(buffer))
}

fn read_u64_le(file: &mut File) -> Result<u64, Error> {
    let mut buffer = [0u8; 8];
    file.read_exact(&mut buffer)?;
    Ok(u64::from_le_bytes(buffer))
}

/// Initial-bound file (binary): a single double, optionally followed by
/// node counts and a full original-space assignment
pub fn read_initial_bound(path: &Path) -> Result<(f64, Option<Vec<Value>>), Error> {
    let mut file = File::open(path)?;
    let bound = read_f64_le(&mut file)?;
    // the counts and the assignment are optional
    let counts = (read_u64_le(&mut file), read_u64_le(&mut file));
    if counts.0.is_err() || counts.1.is_err() {
        return Ok((bound, None));
    }
    let length = match read_i32_le(&mut file) {
        Ok(l) if l >= 0 => l as usize,
        _ => return Ok((bound, None)),
    };
    let mut assignment = Vec::with_capacity(length);
    for _ in 0..length {
        assignment.push(read_i32_le(&mut file)?);
    }
    Ok((bound, Some(assignment)))
}

/// A parsed subproblem restriction: the root variable, its context
/// assignment, and the parent partial solution tree top-down
#[derive(Debug)]
pub struct SubproblemSpec {
    pub root_var: usize,
    pub context_values: Vec<Value>,
    pub pst: Vec<(f64, f64)>,
}

/// Subproblem restriction file (binary): root variable; context length
/// and values; PST length (negative means bottom-up in the file) and the
/// alternating (OR bound, AND label) doubles
pub fn read_subproblem(path: &Path) -> Result<SubproblemSpec, Error> {
    let mut file = File::open(path)?;
    let root_var = read_i32_le(&mut file)?;
    if root_var < 0 {
        return Err(Error::MalformedInput("negative subproblem root".to_string()));
    }
    let context_length = read_i32_le(&mut file)?;
    if context_length < 0 {
        return Err(Error::MalformedInput("negative context length".to_string()));
    }
    let mut context_values = Vec::with_capacity(context_length as usize);
    for _ in 0..context_length {
        context_values.push(read_i32_le(&mut file)?);
    }
    let mut pst_size = read_i32_le(&mut file)?;
    let reversed = pst_size < 0;
    if reversed {
        pst_size = -pst_size;
    }
    let mut pst = Vec::with_capacity(pst_size as usize);
    for _ in 0..pst_size {
        if reversed {
            let label = read_f64_le(&mut file)?;
            let value = read_f64_le(&mut file)?;
            pst.push((value, label));
        } else {
            let value = read_f64_le(&mut file)?;
            let label = read_f64_le(&mut file)?;
            pst.push((value, label));
        }
    }
    if reversed {
        pst.reverse();
    }
    Ok(SubproblemSpec { root_var: root_var as usize, context_values, pst })
}

/// Solution file: the `MPE` header, then the assignment length and the
/// values in original variable order
pub fn write_solution(path: &Path, assignment: &[Value]) -> Result<(), Error> {
    let mut file = File::create(path)?;
    writeln!(file, "MPE")?;
    let values: Vec<String> = assignment.iter().map(|v| v.to_string()).collect();
    writeln!(file, "{} {}", assignment.len(), values.join(" "))?;
    Ok(())
}

#[cfg(test)]
mod test_parsers {

    use super::*;
    use std::io::Write as _;

    #[test]
    fn evidence_pairs_are_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "2 0 1 3 0").unwrap();
        let evidence = read_evidence(file.path()).unwrap();
        assert_eq!(evidence.len(), 2);
        assert_eq!(evidence[&0], 1);
        assert_eq!(evidence[&3], 0);
    }

    #[test]
    fn ordering_must_be_a_permutation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "3 2 0 0").unwrap();
        assert!(read_ordering(file.path(), 3).is_err());
    }

    #[test]
    fn bound_file_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&0.25f64.to_le_bytes()).unwrap();
        let (bound, assignment) = read_initial_bound(file.path()).unwrap();
        assert_eq!(bound, 0.25);
        assert!(assignment.is_none());
    }
}
