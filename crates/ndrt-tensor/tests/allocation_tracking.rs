use std::alloc::Layout;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndrt_tensor::{
    Backend, CpuAllocator, CpuBackend, DType, Tensor, TensorAllocator, TensorAllocatorError,
    TensorError,
};

#[derive(Default)]
struct Counters {
    allocs: AtomicUsize,
    frees: AtomicUsize,
}

struct CountingAllocator {
    counters: Arc<Counters>,
}

impl TensorAllocator for CountingAllocator {
    fn alloc(&self, layout: Layout) -> Result<*mut u8, TensorAllocatorError> {
        self.counters.allocs.fetch_add(1, Ordering::SeqCst);
        CpuAllocator.alloc(layout)
    }

    fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.counters.frees.fetch_add(1, Ordering::SeqCst);
        CpuAllocator.dealloc(ptr, layout)
    }
}

fn counting_backend() -> (Arc<dyn Backend>, Arc<Counters>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let counters = Arc::new(Counters::default());
    let allocator = CountingAllocator {
        counters: Arc::clone(&counters),
    };
    let backend: Arc<dyn Backend> = Arc::new(CpuBackend::with_allocator(Arc::new(allocator)));
    (backend, counters)
}

fn counts(counters: &Counters) -> (usize, usize) {
    (
        counters.allocs.load(Ordering::SeqCst),
        counters.frees.load(Ordering::SeqCst),
    )
}

#[test]
fn buffer_freed_once_after_last_view() -> Result<(), TensorError> {
    let (backend, counters) = counting_backend();
    let base = Tensor::create_in(&[2, 3], DType::Float32, backend)?;
    let view = base.view(12, &[3], &[4])?;
    let reshaped = base.reshape(&[3, 2])?;
    let nested = view.view(4, &[2], &[4])?;
    assert_eq!(base.ref_count(), 4);
    assert_eq!(counts(&counters), (1, 0));

    drop(base);
    drop(view);
    drop(reshaped);
    assert_eq!(counts(&counters), (1, 0));
    assert_eq!(nested.to_vec()?, vec![0.0, 0.0]);

    drop(nested);
    assert_eq!(counts(&counters), (1, 1));
    Ok(())
}

#[test]
fn copies_allocate_their_own_buffer() -> Result<(), TensorError> {
    let (backend, counters) = counting_backend();
    {
        let t = Tensor::from_slice_in(&[2, 2], &[1.0, 2.0, 3.0, 4.0], Arc::clone(&backend))?;
        let c = t.transpose().copy_in(Arc::clone(&backend))?;
        assert_eq!(c.to_vec()?, vec![1.0, 3.0, 2.0, 4.0]);
        let _clone = c.clone();
        assert_eq!(counts(&counters), (2, 0));
    }
    assert_eq!(counts(&counters), (2, 2));
    Ok(())
}

#[test]
fn every_allocation_is_released() -> Result<(), TensorError> {
    let (backend, counters) = counting_backend();
    for n in 0..8 {
        let t = Tensor::create_in(&[n, 2], DType::Float32, Arc::clone(&backend))?;
        let rows: Vec<Tensor> = (0..n as i64).map(|i| t.get_at(i)).collect::<Result<_, _>>()?;
        assert_eq!(t.ref_count(), n + 1);
        drop(rows);
    }
    let (allocs, frees) = counts(&counters);
    assert_eq!(allocs, 8);
    assert_eq!(frees, allocs);
    Ok(())
}
