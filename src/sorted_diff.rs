use crate::order::Comparator;
use std::cmp::Ordering;
use std::convert::Infallible;

/// Lazy `left - right` over two sequences sorted by the same comparator.
///
/// Yields every element of `left` that has no equal in `right`, in `left`'s
/// order and with its multiplicity. Each side is read once, front to back. The
/// first error from either side is yielded and ends the sequence.
pub struct SortedDifference<'c, L, R, T, O> {
    left: L,
    right: R,
    right_head: Option<T>,
    right_done: bool,
    comparator: &'c O,
    finished: bool,
}

impl<'c, L, R, T, O> SortedDifference<'c, L, R, T, O> {
    pub fn new(left: L, right: R, comparator: &'c O) -> Self {
        Self {
            left,
            right,
            right_head: None,
            right_done: false,
            comparator,
            finished: false,
        }
    }
}

impl<L, R, T, E, O> Iterator for SortedDifference<'_, L, R, T, O>
where
    L: Iterator<Item = Result<T, E>>,
    R: Iterator<Item = Result<T, E>>,
    O: Comparator<T>,
{
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        'left: loop {
            let candidate = match self.left.next() {
                Some(Ok(item)) => item,
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    return None;
                }
            };

            loop {
                if self.right_head.is_none() && !self.right_done {
                    match self.right.next() {
                        Some(Ok(item)) => self.right_head = Some(item),
                        Some(Err(e)) => {
                            self.finished = true;
                            return Some(Err(e));
                        }
                        None => self.right_done = true,
                    }
                }
                let Some(head) = &self.right_head else {
                    return Some(Ok(candidate));
                };
                match self.comparator.compare(head, &candidate) {
                    Ordering::Less => self.right_head = None,
                    // Keep the head: later left elements may equal it too.
                    Ordering::Equal => continue 'left,
                    Ordering::Greater => return Some(Ok(candidate)),
                }
            }
        }
    }
}

/// `SortedDifference` for plain, infallible iterators.
pub fn sorted_difference<'c, A, B, T, O>(
    left: A,
    right: B,
    comparator: &'c O,
) -> impl Iterator<Item = T>
where
    A: IntoIterator<Item = T>,
    B: IntoIterator<Item = T>,
    O: Comparator<T>,
{
    SortedDifference::new(
        left.into_iter().map(Ok::<T, Infallible>),
        right.into_iter().map(Ok::<T, Infallible>),
        comparator,
    )
    .map(|item| match item {
        Ok(item) => item,
        Err(never) => match never {},
    })
}
