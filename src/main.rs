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

use clap::Parser;

use aobb::common::Error;
use aobb::Args;

fn main() {
    env_logger::init();
    let args = Args::parse();
    match aobb::solve(&args) {
        Ok(solution) => {
            println!("{}", solution);
            std::process::exit(0);
        },
        Err(e @ (Error::WidthExceeded { .. } | Error::ResourceExceeded(_))) => {
            eprintln!("{}", e);
            std::process::exit(2);
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        },
    }
}
