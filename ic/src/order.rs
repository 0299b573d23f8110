//! Entry name ordering

use std::cmp::Ordering;

/// Order in which a corpus enumerates its entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// The corpus' own order, which for an indexed corpus is index order
    #[default]
    Natural,
    /// Names compared segment-wise, digit runs by numeric value
    Numerical,
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Digits(&'a str),
    Text(&'a str),
}

fn segments(name: &str) -> impl Iterator<Item = Segment<'_>> {
    let mut rest = name;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(rest.len());
        let (head, tail) = rest.split_at(end);
        rest = tail;
        Some(if digits { Segment::Digits(head) } else { Segment::Text(head) })
    })
}

/// Compare digit runs of any length by value
fn cmp_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Compare names so that `s2.xml` sorts before `s10.xml`
///
/// Names that are equal segment-wise (e.g. `1.xml` and `01.xml`) fall back to
/// byte order, so the result is a total order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = segments(a);
    let mut right = segments(b);

    loop {
        let ordering = match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(Segment::Digits(x)), Some(Segment::Digits(y))) => cmp_digits(x, y),
            (
                Some(Segment::Digits(x) | Segment::Text(x)),
                Some(Segment::Digits(y) | Segment::Text(y)),
            ) => x.cmp(y),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }
}
