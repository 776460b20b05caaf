#[macro_export]
macro_rules! trunc {
    ($num:expr, $decimals:expr) => {{
        let factor = 10.0_f64.powi($decimals);
        ($num * factor).round() / factor
    }};
}

/// Format a basis-point quantity as a human percent for log lines.
#[macro_export]
macro_rules! bps_pct {
    ($bps:expr) => {{
        format!("{}%", $crate::trunc!($bps as f64 / 100.0, 2))
    }};
}
