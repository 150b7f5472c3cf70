use std::cmp::Ordering;

/// Total order over elements. Must stay consistent for the lifetime of a bag.
///
/// Distinct bags treat `Ordering::Equal` as "same element", so an order used
/// only to bring duplicates together still has to separate everything that is
/// not a duplicate.
pub trait Comparator<T> {
    fn compare(&self, a: &T, b: &T) -> Ordering;

    fn equal(&self, a: &T, b: &T) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NaturalOrder;

impl<T: Ord> Comparator<T> for NaturalOrder {
    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReverseOrder<O>(pub O);

impl<T, O: Comparator<T>> Comparator<T> for ReverseOrder<O> {
    fn compare(&self, a: &T, b: &T) -> Ordering {
        self.0.compare(b, a)
    }
}

/// Treats every pair as equal. A stable merge under this order keeps
/// source order, which is what unordered bags need.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertionOrder;

impl<T> Comparator<T> for InsertionOrder {
    fn compare(&self, _a: &T, _b: &T) -> Ordering {
        Ordering::Equal
    }
}

impl<T, F> Comparator<T> for F
where
    F: Fn(&T, &T) -> Ordering,
{
    fn compare(&self, a: &T, b: &T) -> Ordering {
        self(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_and_reverse() {
        assert_eq!(NaturalOrder.compare(&1, &2), Ordering::Less);
        assert_eq!(ReverseOrder(NaturalOrder).compare(&1, &2), Ordering::Greater);
        assert!(NaturalOrder.equal(&"a", &"a"));
        assert!(InsertionOrder.equal(&1.5f64, &-2.0f64));
    }

    #[test]
    fn test_closure_comparator() {
        let by_len = |a: &String, b: &String| a.len().cmp(&b.len());
        assert_eq!(by_len.compare(&"aaa".to_string(), &"b".to_string()), Ordering::Greater);
        assert!(by_len.equal(&"ab".to_string(), &"cd".to_string()));
    }
}
