use futures::StreamExt;
use futures::stream;
use std::future::Future;

/// 以给定的最大并发数执行一组异步任务
///
/// 返回结果按完成顺序排列，调用方需要自行按键归并。
pub async fn do_parallel_with_limit<F, T>(futures: Vec<F>, max_concurrent: usize) -> Vec<T>
where
    F: Future<Output = T>,
{
    stream::iter(futures)
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await
}
