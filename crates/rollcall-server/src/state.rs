use std::sync::Arc;

use rollcall_core::{AbsenceAlerts, AttendanceStore, Directory, IdResolution, Notifier, Reconciler};

/// Shared handler state. Clone is cheap - everything sits behind an Arc.
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
    pub directory: Arc<Directory>,
    /// `None` when absence alerts are switched off
    pub alerts: Option<AbsenceAlerts>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        id_resolution: IdResolution,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            reconciler: Arc::new(Reconciler::new(Arc::clone(&store), id_resolution)),
            directory: Arc::new(Directory::new(store)),
            alerts: notifier.map(AbsenceAlerts::new),
        }
    }
}
