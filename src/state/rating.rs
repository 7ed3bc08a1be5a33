/// Fold one more rating into a running mean.
///
/// Returns the new `(rating, count)`. A rider with no ratings takes the
/// submitted value as is.
pub fn running_mean(old_rating: f64, old_count: u32, submitted: u8) -> (f64, u32) {
    let submitted = f64::from(submitted);
    if old_count == 0 {
        return (submitted, 1);
    }
    let count = old_count.saturating_add(1);
    let rating = (old_rating * f64::from(old_count) + submitted) / f64::from(count);
    (rating, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_rating_is_taken_verbatim() {
        assert_eq!(running_mean(0.0, 0, 4), (4.0, 1));
    }

    #[test]
    fn second_rating_averages() {
        assert_eq!(running_mean(4.0, 1, 5), (4.5, 2));
    }

    #[test]
    fn stale_rating_with_zero_count_is_ignored() {
        assert_eq!(running_mean(3.7, 0, 5), (5.0, 1));
    }
}
