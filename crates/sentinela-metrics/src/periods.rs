/*!
 * Janelas de tempo das métricas: chaves de dia, períodos suportados e
 * fronteiras de semana ISO.
 */

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

/// Período suportado pelas métricas agregadas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    LastWeek,
    LastMonth,
    LastHalfYear,
    LastYear,
}

impl Period {
    pub const ALL: [Period; 4] = [
        Period::LastWeek,
        Period::LastMonth,
        Period::LastHalfYear,
        Period::LastYear,
    ];

    pub fn days(&self) -> i64 {
        match self {
            Period::LastWeek => 7,
            Period::LastMonth => 30,
            Period::LastHalfYear => 180,
            Period::LastYear => 365,
        }
    }

    /// Prefixo das chaves de métrica deste período
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Period::LastWeek => "last_week",
            Period::LastMonth => "last_month",
            Period::LastHalfYear => "last_half_year",
            Period::LastYear => "last_year",
        }
    }

    /// Chaves de dia cobertas pelo período, do mais recente ao mais antigo
    pub fn dates(&self) -> Vec<String> {
        last_dates(0, self.days())
    }

    /// Janela de timestamps do período
    pub fn bounds(&self) -> (i64, i64) {
        let today = Utc::now().date_naive();
        let start = today - Duration::days(self.days() - 1);
        let start_ts = Utc
            .from_utc_datetime(&start.and_hms_opt(0, 0, 0).unwrap_or_default())
            .timestamp();
        (start_ts, Utc::now().timestamp())
    }
}

fn day_repr(dt: DateTime<Utc>) -> String {
    dt.format("%d-%m-%y").to_string()
}

/// Últimas chaves de dia, de `start` (dias atrás) até `end` exclusivo
pub fn last_dates(start: i64, end: i64) -> Vec<String> {
    (start..end)
        .map(|i| day_repr(Utc::now() - Duration::days(i)))
        .collect()
}

/// Fronteiras da semana ISO que contém o timestamp: segunda 00:00 inclusive
/// até o último instante do domingo
pub fn week_bounds(ts: i64) -> (i64, i64) {
    let dt = Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now);
    let monday = dt.date_naive() - Duration::days(dt.weekday().num_days_from_monday() as i64);
    let monday_ts = Utc
        .from_utc_datetime(&monday.and_hms_opt(0, 0, 0).unwrap_or_default())
        .timestamp();
    let sunday_ts = monday_ts + 7 * 86_400 - 1;
    (monday_ts, sunday_ts)
}

/// Semanas consecutivas cobrindo o intervalo [min_ts, max_ts]:
/// (segunda_ts, domingo_ts, data inicial, data final)
pub fn weeks_between(min_ts: i64, max_ts: i64) -> Vec<(i64, i64, String, String)> {
    let (first_monday, _) = week_bounds(min_ts);
    let (last_monday, _) = week_bounds(max_ts);
    let week_count = (last_monday - first_monday) / (7 * 86_400) + 1;

    (0..week_count)
        .map(|shift| {
            let monday_ts = first_monday + shift * 7 * 86_400;
            let sunday_ts = monday_ts + 7 * 86_400 - 1;
            let monday = Utc.timestamp_opt(monday_ts, 0).single().unwrap_or_else(Utc::now);
            let sunday = Utc.timestamp_opt(sunday_ts, 0).single().unwrap_or_else(Utc::now);
            (monday_ts, sunday_ts, day_repr(monday), day_repr(sunday))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periods_have_expected_windows() {
        assert_eq!(Period::LastWeek.dates().len(), 7);
        assert_eq!(Period::LastYear.dates().len(), 365);
        assert_eq!(Period::LastMonth.key_prefix(), "last_month");
    }

    #[test]
    fn week_bounds_cover_full_week() {
        // 2023-01-15 é domingo; a semana começa em 09-01-23
        let (monday, sunday) = week_bounds(1673784000);
        assert_eq!(sunday - monday, 7 * 86_400 - 1);
        let monday_dt = Utc.timestamp_opt(monday, 0).single().unwrap();
        assert_eq!(monday_dt.format("%d-%m-%y").to_string(), "09-01-23");
    }

    #[test]
    fn weeks_between_spans_the_range() {
        let (start, _) = week_bounds(1673784000);
        let weeks = weeks_between(1673784000, 1673784000 + 15 * 86_400);
        assert_eq!(weeks.len(), 3);
        assert_eq!(weeks[0].0, start);
        // Semanas contíguas sem buracos
        assert_eq!(weeks[1].0, weeks[0].1 + 1);
        assert_eq!(weeks[2].0, weeks[1].1 + 1);
    }
}
