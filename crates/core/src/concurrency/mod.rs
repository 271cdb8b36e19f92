pub mod bounded_queue;
pub mod task_handle;
pub mod worker_pool;
