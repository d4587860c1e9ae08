use sluice_core::SourceData;

use crate::error::Result;

/// Positions of `request` in ascending order of value, ties kept in request
/// order.
pub(crate) fn argsort(request: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..request.len()).collect();
    order.sort_by_key(|&position| request[position]);
    order
}

/// Reads rows in any order from a reader that only accepts ascending ones:
/// sorts the request, reads once, then puts the rows back in request order.
pub(crate) fn unsorted_fancy_index(
    request: &[usize],
    read_sorted: impl FnOnce(&[usize]) -> Result<SourceData>,
) -> Result<SourceData> {
    if request.windows(2).all(|w| w[0] <= w[1]) {
        return read_sorted(request);
    }
    let order = argsort(request);
    let sorted: Vec<usize> = order.iter().map(|&position| request[position]).collect();
    let data = read_sorted(&sorted)?;
    let mut inverse = vec![0; order.len()];
    for (k, &position) in order.iter().enumerate() {
        inverse[position] = k;
    }
    Ok(data.select(&inverse)?)
}

#[cfg(test)]
mod tests {
    use sluice_core::Array;

    use super::*;

    #[test]
    fn argsort_is_stable() {
        assert_eq!(argsort(&[4, 1, 3, 1]), vec![1, 3, 2, 0]);
    }

    #[test]
    fn rows_come_back_in_request_order() {
        let column = Array::from_vec(vec![10i64, 20, 30, 40, 50]);
        let mut seen = Vec::new();
        let data = unsorted_fancy_index(&[4, 1, 3], |sorted| {
            seen = sorted.to_vec();
            Ok(SourceData::Array(column.select_rows(sorted)?))
        })
        .unwrap();
        assert_eq!(seen, vec![1, 3, 4]);
        assert_eq!(
            data.into_array().unwrap().to_vec::<i64>().unwrap(),
            vec![50, 20, 40]
        );
    }
}
