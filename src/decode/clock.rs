// Clock strings for ffmpeg's -ss / -t arguments

/// Render `seconds` as `HH:MM:SS.00`.
///
/// The value is truncated to whole seconds and the hundredths are always
/// `00`, so excerpt boundaries land on whole seconds. Negative and NaN inputs
/// render as zero.
pub fn format_clock(seconds: f32) -> String {
    let total = if seconds.is_nan() || seconds <= 0.0 {
        0
    } else {
        seconds as u64
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{:02}:{:02}:{:02}.00", hours, minutes, secs)
}
