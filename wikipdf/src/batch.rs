use crate::cache::CachedArticle;

/// Articles per rendered document unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// A run of consecutive cached articles rendered into one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 1-based position among all batches.
    pub number: usize,
    pub articles: Vec<CachedArticle>,
}

impl Batch {
    pub fn first_title(&self) -> &str {
        self.articles.first().map(|a| a.title.as_str()).unwrap_or_default()
    }

    pub fn last_title(&self) -> &str {
        self.articles.last().map(|a| a.title.as_str()).unwrap_or_default()
    }

    /// `<first>_to_<last>`
    pub fn file_stem(&self) -> String {
        format!("{}_to_{}", self.first_title(), self.last_title())
    }
}

/// Split an already sorted article list into fixed-size batches.
///
/// The last batch may be short; `size` must be non-zero.
pub fn plan_batches(articles: &[CachedArticle], size: usize) -> Vec<Batch> {
    assert!(size > 0, "batch size must be non-zero");
    articles
        .chunks(size)
        .enumerate()
        .map(|(i, chunk)| Batch {
            number: i + 1,
            articles: chunk.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn articles(n: usize) -> Vec<CachedArticle> {
        (0..n)
            .map(|i| CachedArticle {
                title: format!("Page {i:03}"),
                path: PathBuf::from(format!("cache/Page {i:03}.txt")),
            })
            .collect()
    }

    #[test]
    fn empty_input_has_no_batches() {
        assert!(plan_batches(&[], DEFAULT_BATCH_SIZE).is_empty());
    }

    #[test]
    fn splits_into_full_batches_and_a_remainder() {
        let batches = plan_batches(&articles(250), DEFAULT_BATCH_SIZE);
        let sizes: Vec<_> = batches.iter().map(|b| b.articles.len()).collect();
        assert_eq!(sizes, [100, 100, 50]);
        assert_eq!(batches[2].number, 3);
        assert_eq!(batches[1].file_stem(), "Page 100_to_Page 199");
        assert_eq!(batches[2].file_stem(), "Page 200_to_Page 249");
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let batches = plan_batches(&articles(200), DEFAULT_BATCH_SIZE);
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn single_article_batch_names_itself_twice() {
        let batches = plan_batches(&articles(1), 10);
        assert_eq!(batches[0].file_stem(), "Page 000_to_Page 000");
    }

    #[test]
    #[should_panic(expected = "batch size must be non-zero")]
    fn zero_size_is_rejected() {
        plan_batches(&articles(3), 0);
    }
}
