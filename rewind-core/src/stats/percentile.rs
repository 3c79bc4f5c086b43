//! Percentile rank of a subject among all subjects.

/// Share of the population (0-100) whose total is strictly below `subject_total`.
///
/// Ties do not count in the subject's favor. An empty population yields 0.
pub fn percentile(subject_total: f64, population: &[f64]) -> f64 {
    if population.is_empty() {
        return 0.0;
    }
    let below = population.iter().filter(|&&x| x < subject_total).count();
    below as f64 / population.len() as f64 * 100.0
}
