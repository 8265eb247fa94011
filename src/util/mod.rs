pub mod env;
pub mod telemetry;

/// Compares two `&str`s without short-circuiting on the first mismatched byte so that the
/// comparison time does not leak how much of the internal token a caller guessed correctly.
pub fn constant_time_cmp(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let diff = a
        .bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (left, right)| acc | std::hint::black_box(left ^ right));

    diff == 0
}
