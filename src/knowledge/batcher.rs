//! Token-bounded embedding batches.
//!
//! Texts are grouped left to right: a batch keeps accepting texts while its
//! running token total stays strictly below the limit; the text that would
//! reach the limit opens the next batch. Each batch is one provider call and
//! the results are concatenated in input order.
//!
//! Batches are independent, so with a worker pool attached they are sent
//! concurrently, as many at once as the pool has threads.

use std::ops::Range;

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::error::{GrokError, Result};
use crate::provider::ModelProvider;
use crate::tokenizer::Tokenize;

pub struct EmbeddingBatcher<'a> {
    provider: &'a dyn ModelProvider,
    tokenizer: &'a dyn Tokenize,
    token_limit: usize,
    pool: Option<&'a ThreadPool>,
}

impl<'a> EmbeddingBatcher<'a> {
    /// A batcher that sends its batches one after another.
    pub fn new(provider: &'a dyn ModelProvider, tokenizer: &'a dyn Tokenize, token_limit: usize) -> Self {
        Self {
            provider,
            tokenizer,
            token_limit,
            pool: None,
        }
    }

    /// Send batches concurrently on `pool`.
    pub fn with_pool(mut self, pool: &'a ThreadPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Embed `texts`, returning one vector per input in input order.
    ///
    /// An empty input makes no provider call. A single text at or over the
    /// token limit is a chunking bug upstream and fails the whole call.
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let counts = texts
            .iter()
            .map(|t| self.tokenizer.count(t))
            .collect::<Result<Vec<_>>>()?;
        let batches = plan_batches(&counts, self.token_limit)?;
        tracing::debug!(texts = texts.len(), batches = batches.len(), "embedding");

        let results: Vec<Vec<Vec<f32>>> = match self.pool {
            Some(pool) if batches.len() > 1 => pool.install(|| {
                batches
                    .par_iter()
                    .map(|range| self.embed_batch(&texts[range.clone()]))
                    .collect::<Result<_>>()
            })?,
            _ => batches
                .iter()
                .map(|range| self.embed_batch(&texts[range.clone()]))
                .collect::<Result<_>>()?,
        };

        let embeddings: Vec<Vec<f32>> = results.into_iter().flatten().collect();
        debug_assert_eq!(embeddings.len(), texts.len());
        tracing::debug!(embeddings = embeddings.len(), "created embeddings");
        Ok(embeddings)
    }

    fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let embeddings = self.provider.create_embeddings(batch)?;
        if embeddings.len() != batch.len() {
            return Err(GrokError::Provider(anyhow::anyhow!(
                "provider returned {} embeddings for {} inputs",
                embeddings.len(),
                batch.len()
            )));
        }
        Ok(embeddings)
    }
}

/// Group token counts into contiguous index ranges whose sums stay below `limit`.
pub fn plan_batches(counts: &[usize], limit: usize) -> Result<Vec<Range<usize>>> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut total = 0;

    for (i, &tokens) in counts.iter().enumerate() {
        if tokens >= limit {
            return Err(GrokError::EmbeddingInputTooLarge {
                index: i,
                tokens,
                limit,
            });
        }
        if total + tokens >= limit {
            batches.push(start..i);
            start = i;
            total = 0;
        }
        total += tokens;
    }
    if start < counts.len() {
        batches.push(start..counts.len());
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatMessage;
    use crate::tokenizer::WordTokenizer;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Mutex;

    /// Embeds each text as `[word count]` and records batch sizes.
    struct RecordingProvider {
        batches: Mutex<Vec<usize>>,
    }

    impl ModelProvider for RecordingProvider {
        fn create_embeddings(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.batches.lock().unwrap().push(texts.len());
            Ok(texts
                .iter()
                .map(|t| vec![t.split_whitespace().count() as f32])
                .collect())
        }

        fn chat(&self, _model: &str, _messages: &[ChatMessage]) -> anyhow::Result<String> {
            unreachable!()
        }
    }

    fn recorder() -> RecordingProvider {
        RecordingProvider {
            batches: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn test_plan_closes_batch_at_limit() {
        let batches = plan_batches(&[3, 3, 3, 1], 7).unwrap();
        assert_eq!(batches, vec![0..2, 2..4]);
    }

    #[test]
    fn test_plan_sum_equal_to_limit_starts_new_batch() {
        let batches = plan_batches(&[5, 5], 10).unwrap();
        assert_eq!(batches, vec![0..1, 1..2]);
    }

    #[test]
    fn test_plan_rejects_oversized_text() {
        let err = plan_batches(&[1, 10], 10).unwrap_err();
        assert!(matches!(
            err,
            GrokError::EmbeddingInputTooLarge {
                index: 1,
                tokens: 10,
                limit: 10
            }
        ));
    }

    #[test]
    fn test_random_plans_respect_limit() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let limit = rng.gen_range(2..500);
            let counts: Vec<usize> = (0..rng.gen_range(0..100))
                .map(|_| rng.gen_range(0..limit))
                .collect();
            let batches = plan_batches(&counts, limit).unwrap();

            let mut next = 0;
            for range in &batches {
                assert_eq!(range.start, next, "batches must be contiguous");
                assert!(!range.is_empty());
                let sum: usize = counts[range.clone()].iter().sum();
                assert!(sum < limit, "batch sum {sum} >= limit {limit}");
                next = range.end;
            }
            assert_eq!(next, counts.len());
        }
    }

    fn pool(threads: usize) -> ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_input_makes_no_call() {
        let provider = recorder();
        let pool = pool(4);
        let batcher = EmbeddingBatcher::new(&provider, &WordTokenizer, 10).with_pool(&pool);
        assert!(batcher.embed(&[]).unwrap().is_empty());
        assert!(provider.batches.lock().unwrap().is_empty());
    }

    #[test]
    fn test_parallel_results_keep_input_order() {
        let provider = recorder();
        let pool = pool(4);
        let batcher = EmbeddingBatcher::new(&provider, &WordTokenizer, 10).with_pool(&pool);
        let texts: Vec<String> = (1..=9).map(|n| vec!["w"; n].join(" ")).collect();

        let embeddings = batcher.embed(&texts).unwrap();
        let words: Vec<f32> = embeddings.iter().map(|e| e[0]).collect();
        assert_eq!(words, (1..=9).map(|n| n as f32).collect::<Vec<_>>());

        let calls = provider.batches.lock().unwrap();
        assert!(calls.len() > 1);
        assert_eq!(calls.iter().sum::<usize>(), 9);
    }

    #[test]
    fn test_sequential_batcher_matches_pooled() {
        let texts: Vec<String> = (1..=9).map(|n| vec!["w"; n].join(" ")).collect();
        let sequential = recorder();
        let pooled = recorder();
        let pool = pool(3);

        let a = EmbeddingBatcher::new(&sequential, &WordTokenizer, 10)
            .embed(&texts)
            .unwrap();
        let b = EmbeddingBatcher::new(&pooled, &WordTokenizer, 10)
            .with_pool(&pool)
            .embed(&texts)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(
            sequential.batches.lock().unwrap().len(),
            pooled.batches.lock().unwrap().len()
        );
    }

    #[test]
    fn test_oversized_text_fails_before_any_call() {
        let provider = recorder();
        let batcher = EmbeddingBatcher::new(&provider, &WordTokenizer, 3);
        let texts = vec!["a".to_string(), "a b c".to_string()];
        assert!(batcher.embed(&texts).is_err());
        assert!(provider.batches.lock().unwrap().is_empty());
    }
}
