//! The worker pool.  One crew of threads per role (grayscale, edge,
//! remove, add) plus a dedicated two-worker team for the energy map.
//!
//! Coordination is nothing but channels: a send on a crew's start
//! channel posts one task, a receive on its finish channel reaps one
//! completion, and a worker exits when the start channel closes.  The
//! matrices crossing the channel are raw-pointer wrappers; every task
//! touches a set of rows (or, for the energy team, columns) disjoint
//! from every other outstanding task, and the dispatching thread
//! blocks until all completions are in before touching the data
//! again.

use std::ops::Range;
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};

use crate::add;
use crate::edge::{self, Kernel};
use crate::energy::{self, EnergyMode};
use crate::error::CarveError;
use crate::gray;
use crate::matrix::Matrix;
use crate::pixel::Rgba8;
use crate::remove;

/// A matrix handle that can cross a channel.  Holders must write only
/// to rows (or columns) no other holder touches, and the owner must
/// keep the matrix alive and unmoved until every task is reaped.
pub(crate) struct SharedMat<T: Default + Copy>(*mut Matrix<T>);

impl<T: Default + Copy> SharedMat<T> {
    pub(crate) fn new(matrix: &mut Matrix<T>) -> Self {
        SharedMat(matrix)
    }

    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn get(&self) -> &mut Matrix<T> {
        &mut *self.0
    }
}

impl<T: Default + Copy> Clone for SharedMat<T> {
    fn clone(&self) -> Self {
        SharedMat(self.0)
    }
}
impl<T: Default + Copy> Copy for SharedMat<T> {}
unsafe impl<T: Default + Copy> Send for SharedMat<T> {}
unsafe impl<T: Default + Copy> Sync for SharedMat<T> {}

/// A read-only slice handle with the same contract.
#[derive(Clone, Copy)]
pub(crate) struct SharedSlice(*const usize, usize);

impl SharedSlice {
    pub(crate) fn new(slice: &[usize]) -> Self {
        SharedSlice(slice.as_ptr(), slice.len())
    }

    pub(crate) unsafe fn get(&self) -> &[usize] {
        std::slice::from_raw_parts(self.0, self.1)
    }
}

unsafe impl Send for SharedSlice {}
unsafe impl Sync for SharedSlice {}

/// One strip of work for a crew.
pub(crate) enum Task {
    Gray {
        source: SharedMat<Rgba8>,
        dest: SharedMat<u8>,
        rows: Range<usize>,
    },
    Edge {
        gray: SharedMat<u8>,
        edge: SharedMat<i32>,
        kernel: Kernel,
        rows: Range<usize>,
    },
    RemoveShift {
        image: SharedMat<Rgba8>,
        gray: SharedMat<u8>,
        weights: SharedMat<i32>,
        energy: SharedMat<i32>,
        path: SharedSlice,
        rows: Range<usize>,
    },
    RemoveEdge {
        gray: SharedMat<u8>,
        edge: SharedMat<i32>,
        path: SharedSlice,
        kernel: Kernel,
        rows: Range<usize>,
    },
    AddSum {
        weights: SharedMat<i32>,
        artificial: SharedMat<i32>,
        sum: SharedMat<i32>,
        rows: Range<usize>,
    },
    AddShift {
        image: SharedMat<Rgba8>,
        gray: SharedMat<u8>,
        weights: SharedMat<i32>,
        artificial: SharedMat<i32>,
        energy: SharedMat<i32>,
        path: SharedSlice,
        add_weight: i32,
        rows: Range<usize>,
    },
    AddEdge {
        gray: SharedMat<u8>,
        edge: SharedMat<i32>,
        path: SharedSlice,
        kernel: Kernel,
        rows: Range<usize>,
    },
}

impl Task {
    fn run(self) {
        unsafe {
            match self {
                Task::Gray { source, dest, rows } => {
                    gray::gray_strip(source.get(), dest.get(), rows)
                }
                Task::Edge {
                    gray,
                    edge,
                    kernel,
                    rows,
                } => edge::edge_strip(gray.get(), edge.get(), kernel, rows),
                Task::RemoveShift {
                    image,
                    gray,
                    weights,
                    energy,
                    path,
                    rows,
                } => remove::shift_strip(
                    image.get(),
                    gray.get(),
                    weights.get(),
                    energy.get(),
                    path.get(),
                    rows,
                ),
                Task::RemoveEdge {
                    gray,
                    edge,
                    path,
                    kernel,
                    rows,
                } => remove::edge_strip(gray.get(), edge.get(), path.get(), kernel, rows),
                Task::AddSum {
                    weights,
                    artificial,
                    sum,
                    rows,
                } => add::sum_strip(weights.get(), artificial.get(), sum.get(), rows),
                Task::AddShift {
                    image,
                    gray,
                    weights,
                    artificial,
                    energy,
                    path,
                    add_weight,
                    rows,
                } => add::shift_strip(
                    image.get(),
                    gray.get(),
                    weights.get(),
                    artificial.get(),
                    energy.get(),
                    path.get(),
                    add_weight,
                    rows,
                ),
                Task::AddEdge {
                    gray,
                    edge,
                    path,
                    kernel,
                    rows,
                } => add::edge_strip(gray.get(), edge.get(), path.get(), kernel, rows),
            }
        }
    }
}

/// A fixed set of threads serving one role.
pub(crate) struct Crew {
    start: Option<Sender<Task>>,
    finish: Receiver<()>,
}

impl Crew {
    fn start(
        name: &str,
        size: usize,
        handles: &mut Vec<thread::JoinHandle<()>>,
    ) -> Result<Crew, CarveError> {
        let (start_tx, start_rx) = channel::unbounded::<Task>();
        let (finish_tx, finish_rx) = channel::unbounded::<()>();
        for i in 0..size {
            let start_rx = start_rx.clone();
            let finish_tx = finish_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, i))
                .spawn(move || {
                    while let Ok(task) = start_rx.recv() {
                        task.run();
                        let _ = finish_tx.send(());
                    }
                })
                .map_err(CarveError::Startup)?;
            handles.push(handle);
        }
        Ok(Crew {
            start: Some(start_tx),
            finish: finish_rx,
        })
    }

    /// Post the tasks without waiting; returns the count to reap.
    pub(crate) fn post(&self, tasks: Vec<Task>) -> usize {
        let count = tasks.len();
        let start = self.start.as_ref().unwrap();
        for task in tasks {
            start.send(task).unwrap();
        }
        count
    }

    pub(crate) fn wait(&self, posted: usize) {
        for _ in 0..posted {
            self.finish.recv().unwrap();
        }
    }

    pub(crate) fn dispatch(&self, tasks: Vec<Task>) {
        let posted = self.post(tasks);
        self.wait(posted);
    }

    fn close(&mut self) {
        self.start.take();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
}

/// Everything one energy worker needs for one build.
#[derive(Clone)]
pub(crate) struct EnergyTask {
    pub(crate) edge: SharedMat<i32>,
    pub(crate) weights: SharedMat<i32>,
    pub(crate) energy: SharedMat<i32>,
    pub(crate) path: Option<SharedSlice>,
    pub(crate) mode: EnergyMode,
    pub(crate) side: Side,
    /// First column owned, inclusive.
    pub(crate) top: usize,
    /// Last column owned, inclusive.
    pub(crate) bot: usize,
    pub(crate) mine: Arc<Vec<Mutex<()>>>,
    pub(crate) not_mine: Arc<Vec<Mutex<()>>>,
}

fn energy_loop(
    task_rx: Receiver<EnergyTask>,
    locks_done: Sender<()>,
    go: Receiver<()>,
    finish: Sender<()>,
) {
    while let Ok(task) = task_rx.recv() {
        let mut guards: Vec<_> = task.mine.iter().map(|m| Some(m.lock().unwrap())).collect();
        let _ = locks_done.send(());
        if go.recv().is_err() {
            return;
        }
        energy::fill_half(&task, &mut guards);
        let _ = finish.send(());
    }
}

/// The two permanent energy workers and their per-row mutex arrays.
struct EnergyTeam {
    task: Option<Sender<EnergyTask>>,
    locks_done: Receiver<()>,
    go: Sender<()>,
    finish: Receiver<()>,
    left_mutexes: Arc<Vec<Mutex<()>>>,
    right_mutexes: Arc<Vec<Mutex<()>>>,
}

impl EnergyTeam {
    fn start(handles: &mut Vec<thread::JoinHandle<()>>) -> Result<EnergyTeam, CarveError> {
        let (task_tx, task_rx) = channel::unbounded::<EnergyTask>();
        let (locks_tx, locks_rx) = channel::unbounded::<()>();
        let (go_tx, go_rx) = channel::unbounded::<()>();
        let (finish_tx, finish_rx) = channel::unbounded::<()>();
        for i in 0..2 {
            let task_rx = task_rx.clone();
            let locks_tx = locks_tx.clone();
            let go_rx = go_rx.clone();
            let finish_tx = finish_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("energy-{}", i))
                .spawn(move || energy_loop(task_rx, locks_tx, go_rx, finish_tx))
                .map_err(CarveError::Startup)?;
            handles.push(handle);
        }
        Ok(EnergyTeam {
            task: Some(task_tx),
            locks_done: locks_rx,
            go: go_tx,
            finish: finish_rx,
            left_mutexes: Arc::new(Vec::new()),
            right_mutexes: Arc::new(Vec::new()),
        })
    }

    fn close(&mut self) {
        self.task.take();
    }
}

pub(crate) struct Pool {
    threads: usize,
    pub(crate) gray: Crew,
    pub(crate) edge: Crew,
    pub(crate) remove: Crew,
    pub(crate) add: Crew,
    energy: EnergyTeam,
    handles: Vec<thread::JoinHandle<()>>,
}

impl Pool {
    pub(crate) fn start(threads: usize) -> Result<Pool, CarveError> {
        let threads = threads.max(2);
        let mut handles = Vec::new();
        let gray = Crew::start("gray", threads, &mut handles)?;
        let edge = Crew::start("edge", threads, &mut handles)?;
        let remove = Crew::start("remove", threads, &mut handles)?;
        let add = Crew::start("add", threads, &mut handles)?;
        let energy = EnergyTeam::start(&mut handles)?;
        Ok(Pool {
            threads,
            gray,
            edge,
            remove,
            add,
            energy,
            handles,
        })
    }

    /// Cut a row range into one contiguous strip per crew thread.
    /// The last strip absorbs the remainder; strips may be empty.
    pub(crate) fn strips(&self, range: Range<usize>) -> Vec<Range<usize>> {
        let count = self.threads;
        let length = range.end.saturating_sub(range.start);
        let per = length / count;
        (0..count)
            .map(|i| {
                let start = range.start + i * per;
                let end = cq!(i + 1 == count, range.end, start + per);
                start..end
            })
            .collect()
    }

    /// Rebuild the handshake mutex arrays when the image height
    /// changes between builds.
    pub(crate) fn resize_energy(&mut self, height: usize) {
        if self.energy.left_mutexes.len() != height {
            self.energy.left_mutexes = Arc::new((0..height).map(|_| Mutex::new(())).collect());
            self.energy.right_mutexes = Arc::new((0..height).map(|_| Mutex::new(())).collect());
        }
    }

    /// One complete energy build.  The phase order matters: the first
    /// worker must hold all its locks before the second starts taking
    /// its own, and both must hold theirs before either runs.
    pub(crate) fn energy_map(
        &mut self,
        edge: &mut Matrix<i32>,
        weights: &mut Matrix<i32>,
        energy: &mut Matrix<i32>,
        mode: EnergyMode,
        path: Option<&[usize]>,
    ) {
        let width = edge.width();
        let height = edge.height();
        self.resize_energy(height);
        let mid = width / 2;
        let left = EnergyTask {
            edge: SharedMat::new(edge),
            weights: SharedMat::new(weights),
            energy: SharedMat::new(energy),
            path: path.map(SharedSlice::new),
            mode,
            side: Side::Left,
            top: 0,
            bot: mid,
            mine: self.energy.left_mutexes.clone(),
            not_mine: self.energy.right_mutexes.clone(),
        };
        let right = EnergyTask {
            side: Side::Right,
            top: mid + 1,
            bot: width - 1,
            mine: self.energy.right_mutexes.clone(),
            not_mine: self.energy.left_mutexes.clone(),
            ..left.clone()
        };
        let task = self.energy.task.as_ref().unwrap();
        task.send(left).unwrap();
        self.energy.locks_done.recv().unwrap();
        task.send(right).unwrap();
        self.energy.locks_done.recv().unwrap();
        self.energy.go.send(()).unwrap();
        self.energy.go.send(()).unwrap();
        self.energy.finish.recv().unwrap();
        self.energy.finish.recv().unwrap();
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.gray.close();
        self.edge.close();
        self.remove.close();
        self.add.close();
        self.energy.close();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
