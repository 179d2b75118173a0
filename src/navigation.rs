// Navigation between surfaces of the client

use parking_lot::RwLock;

/// Where the user is and how to move them
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;
    fn navigate_to(&self, path: &str);
}

/// In-process navigator that tracks the current path and keeps a history
/// of every navigation.
pub struct HistoryNavigator {
    current: RwLock<String>,
    history: RwLock<Vec<String>>,
}

impl HistoryNavigator {
    pub fn new(start: &str) -> Self {
        Self {
            current: RwLock::new(start.to_string()),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Every path navigated to, oldest first
    pub fn history(&self) -> Vec<String> {
        self.history.read().clone()
    }
}

impl Navigator for HistoryNavigator {
    fn current_path(&self) -> String {
        self.current.read().clone()
    }

    fn navigate_to(&self, path: &str) {
        tracing::info!(from = %self.current.read(), to = %path, "Navigating");
        *self.current.write() = path.to_string();
        self.history.write().push(path.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_navigator() {
        let nav = HistoryNavigator::new("/dashboard/");
        assert_eq!(nav.current_path(), "/dashboard/");
        assert!(nav.history().is_empty());

        nav.navigate_to("/login");
        nav.navigate_to("/dashboard/history");

        assert_eq!(nav.current_path(), "/dashboard/history");
        assert_eq!(nav.history(), vec!["/login", "/dashboard/history"]);
    }
}
