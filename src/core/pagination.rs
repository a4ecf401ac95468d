//! Page slicing for feeds and comment lists.
//!
//! Out-of-range requests never fail: a page number past the end (or below 1)
//! yields the last page, and anything that is not a number yields the first.

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: usize,
    pub num_pages: usize,
    pub total_count: usize,
}

impl<T> Page<T> {
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            num_pages: self.num_pages,
            total_count: self.total_count,
        }
    }
}

pub struct Paginator<T> {
    items: Vec<T>,
    per_page: usize,
}

impl<T> Paginator<T> {
    pub fn new(items: Vec<T>, per_page: usize) -> Self {
        Self {
            items,
            per_page: per_page.max(1),
        }
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// At least one page, even when empty.
    pub fn num_pages(&self) -> usize {
        self.count().div_ceil(self.per_page).max(1)
    }

    pub fn get_page(self, raw: Option<&str>) -> Page<T> {
        let num_pages = self.num_pages();
        let number = match raw.map(str::trim) {
            Some(s) if is_integer(s) => match s.parse::<i64>() {
                Ok(n) if n >= 1 && (n as usize) <= num_pages => n as usize,
                // Includes integers too large for i64.
                _ => num_pages,
            },
            _ => 1,
        };

        let total_count = self.count();
        let start = (number - 1) * self.per_page;
        let items = self
            .items
            .into_iter()
            .skip(start)
            .take(self.per_page)
            .collect();

        Page {
            items,
            number,
            num_pages,
            total_count,
        }
    }
}

fn is_integer(s: &str) -> bool {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(n: usize) -> Vec<usize> {
        (1..=n).collect()
    }

    #[test]
    fn thirteen_items_split_ten_and_three() {
        let first = Paginator::new(numbers(13), 10).get_page(None);
        assert_eq!(first.len(), 10);
        assert_eq!(first.num_pages, 2);
        assert!(first.has_next());

        let second = Paginator::new(numbers(13), 10).get_page(Some("2"));
        assert_eq!(second.items, vec![11, 12, 13]);
        assert!(second.has_previous());
        assert!(!second.has_next());
    }

    #[test]
    fn page_counts_follow_ceiling_division() {
        for per_page in 1..=7 {
            for total in 0..=30 {
                let paginator = Paginator::new(numbers(total), per_page);
                let pages = paginator.num_pages();
                assert_eq!(pages, total.div_ceil(per_page).max(1));

                let last = Paginator::new(numbers(total), per_page).get_page(Some(&pages.to_string()));
                let expected = match total % per_page {
                    0 if total == 0 => 0,
                    0 => per_page,
                    rest => rest,
                };
                assert_eq!(last.len(), expected, "per_page={per_page} total={total}");
            }
        }
    }

    #[test]
    fn out_of_range_yields_last_page() {
        let page = Paginator::new(numbers(13), 10).get_page(Some("99"));
        assert_eq!(page.number, 2);
        let page = Paginator::new(numbers(13), 10).get_page(Some("0"));
        assert_eq!(page.number, 2);
        let page = Paginator::new(numbers(13), 10).get_page(Some("-4"));
        assert_eq!(page.number, 2);
        let page = Paginator::new(numbers(13), 10).get_page(Some("99999999999999999999"));
        assert_eq!(page.number, 2);
        assert_eq!(page.items, vec![11, 12, 13]);
    }

    #[test]
    fn garbage_yields_first_page() {
        let page = Paginator::new(numbers(13), 10).get_page(Some("abc"));
        assert_eq!(page.number, 1);
        assert_eq!(page.len(), 10);
        for raw in ["", "1.5", "-", "2x"] {
            assert_eq!(Paginator::new(numbers(13), 10).get_page(Some(raw)).number, 1, "{raw:?}");
        }
    }

    #[test]
    fn empty_list_has_one_empty_page() {
        let page = Paginator::new(Vec::<u8>::new(), 10).get_page(Some("5"));
        assert_eq!(page.number, 1);
        assert_eq!(page.num_pages, 1);
        assert!(page.is_empty());
    }
}
