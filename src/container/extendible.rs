use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use xxhash_rust::xxh3::Xxh3;

use crate::error::{Error, Result};

use super::HashTable;

/// Splitting stops once a bucket's local depth covers every bit of the
/// 64-bit hash; past that point the keys are indistinguishable and the
/// insert fails instead of spinning.
const MAX_DEPTH: u32 = (8 * std::mem::size_of::<u64>()) as u32;

/// Deterministic, well-spread 64-bit hash. xxh3 is seedless here on
/// purpose: the directory index of a key must not change across table
/// instances or process runs.
fn hash_of<K: Hash>(key: &K) -> u64 {
    let mut hasher = Xxh3::new();
    key.hash(&mut hasher);
    hasher.finish()
}

fn low_bits(depth: u32) -> u64 {
    if depth == 0 {
        0
    } else {
        u64::MAX >> (64 - depth)
    }
}

struct Bucket<K, V> {
    /// Number of low hash bits all keys in this bucket share with the
    /// directory entries pointing at it.
    depth: u32,
    /// Up to `bucket_size` pairs in insertion order.
    items: Vec<(K, V)>,
}

/// ExtendibleHashTable implements a hash table with a growing directory.
///
/// The directory holds `2^global_depth` entries, each an index into an
/// arena of buckets; several entries may share one bucket. A full bucket
/// splits in two and redistributes its pairs by the next hash bit,
/// doubling the directory first whenever the bucket's local depth already
/// equals the global depth. The directory never shrinks.
pub struct ExtendibleHashTable<K, V> {
    global_depth: u32,
    bucket_size: usize,
    /// Directory entries, indices into `buckets`.
    dir: Vec<usize>,
    /// Arena of buckets. Buckets are only ever appended; a split keeps the
    /// old slot and claims a new one.
    buckets: Vec<Bucket<K, V>>,
}

impl<K: Eq + Hash, V: Clone> ExtendibleHashTable<K, V> {
    /// Create a table with one empty bucket of the given capacity and a
    /// single-entry directory. A zero bucket capacity could never accept
    /// an insert and is rejected here.
    pub fn new(bucket_size: usize) -> Result<Self> {
        if bucket_size == 0 {
            return Err(Error::value("bucket size must be greater than zero"));
        }
        let buckets = vec![Bucket { depth: 0, items: Vec::new() }];
        Ok(ExtendibleHashTable { global_depth: 0, bucket_size, dir: vec![0], buckets })
    }

    /// The directory index the key hashes to, i.e. the low `global_depth`
    /// bits of its hash.
    fn index_of(&self, key: &K) -> usize {
        (hash_of(key) & low_bits(self.global_depth)) as usize
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let bucket = &self.buckets[self.dir[self.index_of(key)]];
        bucket.items.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    /// Insert a pair, overwriting the value if the key is present. When
    /// the target bucket is full, split it and retry; a single split may
    /// leave every pair on one side, so this loops until the pair fits.
    pub fn insert(&mut self, key: K, value: V) -> Result<()> {
        loop {
            let b = self.dir[self.index_of(&key)];
            let bucket = &mut self.buckets[b];
            if let Some((_, v)) = bucket.items.iter_mut().find(|(k, _)| *k == key) {
                *v = value;
                return Ok(());
            }
            if bucket.items.len() < self.bucket_size {
                bucket.items.push((key, value));
                return Ok(());
            }
            self.split(b)?;
        }
    }

    /// Remove the pair under the key, reporting whether it existed.
    /// Buckets and directory entries are never reclaimed on removal.
    pub fn remove(&mut self, key: &K) -> bool {
        let b = self.dir[self.index_of(key)];
        let bucket = &mut self.buckets[b];
        match bucket.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                bucket.items.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Split the full bucket at arena slot `b`: grow the directory if
    /// needed, allocate the sibling bucket, redistribute the pairs by the
    /// bit `1 << old_local_depth`, and redirect the directory entries that
    /// now belong to the sibling.
    fn split(&mut self, b: usize) -> Result<()> {
        let local_depth = self.buckets[b].depth;
        if local_depth == MAX_DEPTH {
            return Err(Error::KeyspaceExhausted);
        }
        if local_depth == self.global_depth {
            // dir[i + old_size] = dir[i]: both halves keep pointing at the
            // same buckets until the redirect below.
            self.dir.extend_from_within(..);
            self.global_depth += 1;
        }

        let mask = 1u64 << local_depth;
        self.buckets[b].depth += 1;
        let sibling_depth = self.buckets[b].depth;
        let sibling = self.buckets.len();
        self.buckets.push(Bucket { depth: sibling_depth, items: Vec::new() });

        let items = std::mem::take(&mut self.buckets[b].items);
        for (k, v) in items {
            if hash_of(&k) & mask != 0 {
                self.buckets[sibling].items.push((k, v));
            } else {
                self.buckets[b].items.push((k, v));
            }
        }

        for (index, slot) in self.dir.iter_mut().enumerate() {
            if *slot == b && index as u64 & mask != 0 {
                *slot = sibling;
            }
        }
        Ok(())
    }

    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    pub fn local_depth(&self, dir_index: usize) -> u32 {
        self.buckets[self.dir[dir_index]].depth
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }
}

/// SyncExtendibleHashTable is the thread-safe rendition: one mutex
/// serializes every externally visible operation, all the heavy lifting
/// happens in the ExtendibleHashTable.
pub struct SyncExtendibleHashTable<K, V> {
    inner: Mutex<ExtendibleHashTable<K, V>>,
}

impl<K: Eq + Hash, V: Clone> SyncExtendibleHashTable<K, V> {
    pub fn new(bucket_size: usize) -> Result<Self> {
        let inner = Mutex::new(ExtendibleHashTable::new(bucket_size)?);
        Ok(SyncExtendibleHashTable { inner })
    }
}

impl<K, V> HashTable<K, V> for SyncExtendibleHashTable<K, V>
where
    K: Eq + Hash + Send,
    V: Clone + Send,
{
    fn find(&self, key: &K) -> Option<V> {
        let guard = self.inner.lock().unwrap();
        guard.find(key)
    }

    fn insert(&self, key: K, value: V) -> Result<()> {
        let mut guard = self.inner.lock()?;
        guard.insert(key, value)
    }

    fn remove(&self, key: &K) -> bool {
        let mut guard = self.inner.lock().unwrap();
        guard.remove(key)
    }

    fn global_depth(&self) -> u32 {
        let guard = self.inner.lock().unwrap();
        guard.global_depth()
    }

    fn local_depth(&self, dir_index: usize) -> u32 {
        let guard = self.inner.lock().unwrap();
        guard.local_depth(dir_index)
    }

    fn num_buckets(&self) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.num_buckets()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rand::prelude::*;

    use super::*;

    /// The structural invariants that must hold between any two
    /// operations: directory size matches the global depth, local depths
    /// never exceed it, and every pair of entries sharing a bucket agrees
    /// in the bucket's low depth bits.
    fn check_invariants<K: Eq + Hash, V: Clone>(table: &ExtendibleHashTable<K, V>) {
        assert_eq!(1usize << table.global_depth, table.dir.len());
        for &slot in &table.dir {
            assert!(table.buckets[slot].depth <= table.global_depth);
        }
        for i in 0..table.dir.len() {
            for j in 0..i {
                if table.dir[i] == table.dir[j] {
                    let depth = table.buckets[table.dir[i]].depth;
                    assert_eq!(
                        i as u64 & low_bits(depth),
                        j as u64 & low_bits(depth),
                        "entries {} and {} share a bucket of depth {}",
                        i,
                        j,
                        depth
                    );
                }
            }
        }
    }

    #[test]
    fn test_zero_bucket_size_rejected() {
        assert!(ExtendibleHashTable::<u32, u32>::new(0).is_err());
    }

    #[test]
    fn test_insert_find_remove() -> Result<()> {
        let mut table = ExtendibleHashTable::new(2)?;

        table.insert(1, "a")?;
        table.insert(2, "b")?;
        assert_eq!(Some("a"), table.find(&1));
        assert_eq!(Some("b"), table.find(&2));
        assert_eq!(None, table.find(&3));

        // overwrite keeps a single pair per key
        table.insert(1, "c")?;
        assert_eq!(Some("c"), table.find(&1));

        assert!(table.remove(&1));
        assert_eq!(None, table.find(&1));
        assert!(!table.remove(&1));
        Ok(())
    }

    #[test]
    fn test_split_grows_directory() -> Result<()> {
        let mut table = ExtendibleHashTable::new(2)?;
        assert_eq!(0, table.global_depth());
        assert_eq!(1, table.num_buckets());

        // Three pairs cannot fit in one bucket of two, so at least one
        // split (and with it the first directory doubling) must happen.
        for i in 0..32u64 {
            table.insert(i, i * 10)?;
            check_invariants(&table);
        }
        assert!(table.num_buckets() >= 2);
        assert!(table.global_depth() >= 1);
        for i in 0..32u64 {
            assert_eq!(Some(i * 10), table.find(&i));
        }
        Ok(())
    }

    #[test]
    fn test_removal_never_shrinks() -> Result<()> {
        let mut table = ExtendibleHashTable::new(2)?;
        for i in 0..64u64 {
            table.insert(i, i)?;
        }
        let buckets = table.num_buckets();
        let depth = table.global_depth();
        for i in 0..64u64 {
            assert!(table.remove(&i));
        }
        assert_eq!(buckets, table.num_buckets());
        assert_eq!(depth, table.global_depth());
        check_invariants(&table);
        Ok(())
    }

    #[test]
    fn test_random_against_hashmap() -> Result<()> {
        let mut rng = rand::thread_rng();
        let mut table = ExtendibleHashTable::new(3)?;
        let mut model: HashMap<u16, u64> = HashMap::new();

        for _ in 0..4096 {
            let key: u16 = rng.gen_range(0..512);
            match rng.gen_range(0..3) {
                0 => {
                    let value: u64 = rng.gen();
                    table.insert(key, value)?;
                    model.insert(key, value);
                }
                1 => {
                    assert_eq!(model.remove(&key).is_some(), table.remove(&key));
                }
                _ => {
                    assert_eq!(model.get(&key).cloned(), table.find(&key));
                }
            }
        }
        check_invariants(&table);
        for (key, value) in &model {
            assert_eq!(Some(*value), table.find(key));
        }
        Ok(())
    }

    #[test]
    fn test_sync_wrapper() -> Result<()> {
        let table = SyncExtendibleHashTable::new(2)?;
        table.insert(7u32, 70u32)?;
        assert_eq!(Some(70), table.find(&7));
        assert!(table.remove(&7));
        assert_eq!(None, table.find(&7));
        assert!(table.num_buckets() >= 1);
        Ok(())
    }
}
