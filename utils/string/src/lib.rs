/// Clamp a byte position to the nearest UTF-8 char boundary at or before it.
///
/// Positions past the end of the string clamp to `s.len()`. Buffer offsets
/// that have been remapped through edits can land mid-char; callers clamp
/// before slicing to avoid panics.
#[inline]
pub fn clamp_to_char_boundary(s: &str, pos: usize) -> usize {
    let mut p = pos.min(s.len());
    while p > 0 && !s.is_char_boundary(p) {
        p -= 1;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn clamp_is_identity_on_boundaries() {
        let s = "hello";
        for p in 0..=s.len() {
            assert_eq!(clamp_to_char_boundary(s, p), p);
        }
    }

    #[test]
    fn clamp_moves_back_to_previous_boundary() {
        let s = "a€b"; // '€' is 3 bytes at offset 1
        assert_eq!(clamp_to_char_boundary(s, 2), 1);
        assert_eq!(clamp_to_char_boundary(s, 3), 1);
        assert_eq!(clamp_to_char_boundary(s, 4), 4);
    }

    #[test]
    fn clamp_handles_out_of_range() {
        assert_eq!(clamp_to_char_boundary("abc", 100), 3);
        assert_eq!(clamp_to_char_boundary("", 5), 0);
    }
}
