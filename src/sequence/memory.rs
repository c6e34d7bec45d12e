//! 序列号分配的内存实现（测试用）

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::Result;
use crate::sequence::SequenceAllocator;

#[derive(Clone, Default)]
pub struct InMemorySequenceAllocator {
    counters: Arc<Mutex<HashMap<String, i64>>>,
}

impl InMemorySequenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SequenceAllocator for InMemorySequenceAllocator {
    async fn next(&self, conversation_id: &str) -> Result<i64> {
        let mut guard = self.counters.lock().unwrap();
        let counter = guard.entry(conversation_id.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn next_batch(&self, conversation_id: &str, count: i64) -> Result<(i64, i64)> {
        let mut guard = self.counters.lock().unwrap();
        let counter = guard.entry(conversation_id.to_string()).or_insert(0);
        *counter += count;
        Ok((*counter - count + 1, *counter))
    }

    async fn current(&self, conversation_id: &str) -> Result<i64> {
        let guard = self.counters.lock().unwrap();
        Ok(guard.get(conversation_id).copied().unwrap_or(0))
    }

    async fn reset(&self, conversation_id: &str) -> Result<()> {
        let mut guard = self.counters.lock().unwrap();
        guard.remove(conversation_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_starts_at_one_and_increments() {
        let seq = InMemorySequenceAllocator::new();
        assert_eq!(seq.current("alice:bob").await.unwrap(), 0);
        assert_eq!(seq.next("alice:bob").await.unwrap(), 1);
        assert_eq!(seq.next("alice:bob").await.unwrap(), 2);
        assert_eq!(seq.current("alice:bob").await.unwrap(), 2);
        // 不同会话互不影响
        assert_eq!(seq.next("alice:carol").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_batch_reserves_contiguous_range() {
        let seq = InMemorySequenceAllocator::new();
        assert_eq!(seq.next_batch("room", 10).await.unwrap(), (1, 10));
        assert_eq!(seq.next_batch("room", 5).await.unwrap(), (11, 15));
        assert_eq!(seq.next("room").await.unwrap(), 16);
    }

    #[tokio::test]
    async fn test_concurrent_next_is_strictly_increasing() {
        // 测试：并发取号不重复、不遗漏
        let seq = InMemorySequenceAllocator::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let seq = seq.clone();
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                for _ in 0..50 {
                    got.push(seq.next("busy").await.unwrap());
                }
                got
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_unstable();
        let expected: Vec<i64> = (1..=400).collect();
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn test_reset_restarts_from_one() {
        let seq = InMemorySequenceAllocator::new();
        seq.next("conv").await.unwrap();
        seq.reset("conv").await.unwrap();
        assert_eq!(seq.next("conv").await.unwrap(), 1);
    }
}
