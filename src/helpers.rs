use crate::error::{Error, Result};

/// Split `items` into consecutive chunks of `size`; the last may be shorter.
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Result<Vec<Vec<T>>> {
    if size == 0 {
        return Err(Error::invalid("chunk size", "must be greater than zero"));
    }
    Ok(items.chunks(size).map(<[T]>::to_vec).collect())
}

/// Uppercase the first character and lowercase the rest.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Restrict `value` to `min..=max`.
pub fn clamp<T: PartialOrd>(value: T, min: T, max: T) -> Result<T> {
    if min > max {
        return Err(Error::invalid("clamp bounds", "min is greater than max"));
    }
    Ok(if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    })
}
