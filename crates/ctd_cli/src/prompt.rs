//! Interactive latitude entry for `latitude_method = "ask"`.

use std::io::{self, BufRead, Write};

use ctd_core::latitude::{LatitudeError, LatitudeResult, LatitudeService};
use parking_lot::Mutex;

/// Asks on the terminal for each cast's latitude. An empty answer skips the cast.
#[derive(Default)]
pub struct PromptLatitude {
    // Serializes prompts if lookups ever come from several threads.
    lock: Mutex<()>,
}

impl LatitudeService for PromptLatitude {
    fn lookup(&self, base_name: &str) -> LatitudeResult<f64> {
        let _guard = self.lock.lock();
        let stdin = io::stdin();
        let mut line = String::new();

        loop {
            eprint!("Latitude for {} (blank to skip): ", base_name);
            let _ = io::stderr().flush();

            line.clear();
            let read = stdin
                .lock()
                .read_line(&mut line)
                .map_err(|_| LatitudeError::Cancelled(base_name.to_string()))?;
            let answer = line.trim();
            if read == 0 || answer.is_empty() {
                return Err(LatitudeError::Cancelled(base_name.to_string()));
            }

            match answer.parse::<f64>() {
                Ok(lat) if lat.is_finite() && (-90.0..=90.0).contains(&lat) => return Ok(lat),
                _ => eprintln!("'{}' is not a latitude between -90 and 90", answer),
            }
        }
    }
}
