use serde::Serialize;

/// Abgeleiteter, nicht persistierter Fortschritt eines Jobs
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub source_count: u64,
    pub destination_count: u64,
    pub percentage: f64,
    /// Dokumente/Sekunde im letzten Poll-Intervall
    pub instantaneous_rate: f64,
    /// Dokumente/Sekunde seit Job-Start
    pub average_rate: f64,
    /// 0 wenn unbekannt (noch keine Rate)
    pub eta_seconds: f64,
}

/// Eingaben für die Berechnung eines Snapshots
#[derive(Debug, Clone, Copy)]
pub struct ProgressInput {
    pub source_count: u64,
    pub destination_count: u64,
    pub previous_migrated: u64,
    pub elapsed_seconds: f64,
    pub poll_interval_seconds: f64,
}

impl ProgressSnapshot {
    pub fn compute(input: ProgressInput) -> Self {
        let source = input.source_count as f64;
        let destination = input.destination_count as f64;

        let percentage = if input.source_count == 0 {
            100.0
        } else {
            100.0 * destination / source
        };

        // Rückgang im Ziel (z.B. TTL) zählt nicht als negative Rate
        let inserted_since_last_poll = input
            .destination_count
            .saturating_sub(input.previous_migrated) as f64;
        let instantaneous_rate = if input.poll_interval_seconds > 0.0 {
            inserted_since_last_poll / input.poll_interval_seconds
        } else {
            0.0
        };

        let average_rate = if input.elapsed_seconds > 0.0 {
            destination / input.elapsed_seconds
        } else {
            0.0
        };

        let remaining = input.source_count.saturating_sub(input.destination_count) as f64;
        let eta_seconds = if average_rate > 0.0 {
            remaining / average_rate
        } else {
            0.0
        };

        Self {
            source_count: input.source_count,
            destination_count: input.destination_count,
            percentage,
            instantaneous_rate,
            average_rate,
            eta_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(source: u64, destination: u64, previous: u64, elapsed: f64) -> ProgressInput {
        ProgressInput {
            source_count: source,
            destination_count: destination,
            previous_migrated: previous,
            elapsed_seconds: elapsed,
            poll_interval_seconds: 10.0,
        }
    }

    #[test]
    fn test_reference_numbers() {
        let snapshot = ProgressSnapshot::compute(input(1000, 250, 200, 100.0));
        assert_eq!(snapshot.average_rate, 2.5);
        assert_eq!(snapshot.percentage, 25.0);
        assert_eq!(snapshot.eta_seconds, 300.0);
        assert_eq!(snapshot.instantaneous_rate, 5.0);
    }

    #[test]
    fn test_empty_source_is_complete() {
        let snapshot = ProgressSnapshot::compute(input(0, 0, 0, 50.0));
        assert_eq!(snapshot.percentage, 100.0);
        assert_eq!(snapshot.eta_seconds, 0.0);
    }

    #[test]
    fn test_zero_elapsed_has_no_rate() {
        let snapshot = ProgressSnapshot::compute(input(1000, 10, 0, 0.0));
        assert_eq!(snapshot.average_rate, 0.0);
        assert_eq!(snapshot.eta_seconds, 0.0);
    }

    #[test]
    fn test_shrinking_destination_has_zero_instant_rate() {
        let snapshot = ProgressSnapshot::compute(input(1000, 90, 100, 10.0));
        assert_eq!(snapshot.instantaneous_rate, 0.0);
    }

    #[test]
    fn test_destination_ahead_of_source() {
        // Ziel enthält bereits mehr Dokumente als die Quelle
        let snapshot = ProgressSnapshot::compute(input(100, 120, 100, 10.0));
        assert_eq!(snapshot.percentage, 120.0);
        assert_eq!(snapshot.eta_seconds, 0.0);
    }
}
