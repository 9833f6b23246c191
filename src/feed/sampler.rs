use rand::seq::index;
use rand::Rng;

/// 从 `0..n` 中无放回地均匀抽取 `k` 个不同下标，顺序随机
///
/// `k` 大于 `n` 时按 `n` 处理。
pub fn sample_distinct<R: Rng + ?Sized>(rng: &mut R, n: usize, k: usize) -> Vec<usize> {
    let k = k.min(n);
    if k == 0 {
        return Vec::new();
    }
    index::sample(rng, n, k).into_vec()
}

/// 从切片中抽取 `k` 个不同元素的克隆
pub fn sample_from<T: Clone, R: Rng + ?Sized>(rng: &mut R, items: &[T], k: usize) -> Vec<T> {
    sample_distinct(rng, items.len(), k)
        .into_iter()
        .map(|i| items[i].clone())
        .collect()
}
