//! Moving-average regime labelling for [`TimeSignals`](crate::domain::alpha::TimeSignals).

use crate::domain::time_series::TimeIndexed;
use chrono::NaiveDate;

/// Label every bar by comparing its close with the trailing SMA(`window`).
///
/// Close >= SMA gets `above`, otherwise `below`. Bars inside the warm-up
/// window have no average yet and are labelled `below`.
pub fn moving_average_regime(
    closes: &[(NaiveDate, f64)],
    window: usize,
    above: &str,
    below: &str,
) -> TimeIndexed<String> {
    let mut labels = TimeIndexed::new();
    if window == 0 {
        return labels;
    }

    let mut sum = 0.0;
    for (i, &(date, close)) in closes.iter().enumerate() {
        sum += close;
        if i >= window {
            sum -= closes[i - window].1;
        }
        let label = if i + 1 >= window && close >= sum / window as f64 {
            above
        } else {
            below
        };
        labels.insert(date, label.to_string());
    }

    labels
}
