use std::fs;
use std::path::PathBuf;

use crate::proxy::model::Proxy;
use crate::scripts::repository::{Repository, ScriptHandle};
use crate::scripts::Script;

/// Ordered collection of proxies, kept sorted by index, with trash
/// tracking for proxies removed by the user whose files still await
/// deletion at save time.
#[derive(Debug, Default)]
pub struct ProxyList {
    proxies: Vec<Proxy>,
    trash: Vec<PathBuf>,
}

impl ProxyList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, proxy: Proxy) {
        self.proxies.push(proxy);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Proxy> {
        self.proxies.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Proxy> {
        self.proxies.iter_mut()
    }

    pub fn get(&self, pos: usize) -> Option<&Proxy> {
        self.proxies.get(pos)
    }

    pub fn get_mut(&mut self, pos: usize) -> Option<&mut Proxy> {
        self.proxies.get_mut(pos)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn sort(&mut self) {
        self.proxies.sort_by_key(|p| p.index);
    }

    /// Positions of all proxies wrapping the given script.
    pub fn positions_for_script(&self, script: ScriptHandle) -> Vec<usize> {
        self.proxies
            .iter()
            .enumerate()
            .filter(|(_, p)| p.data_source == Some(script))
            .map(|(i, _)| i)
            .collect()
    }

    /// Physical proxying is only required when more than one proxy maps
    /// to the same script; a single proxy is satisfied by a rename.
    pub fn proxy_required(&self, script: ScriptHandle) -> bool {
        self.positions_for_script(script).len() > 1
    }

    /// Reconcile every proxy of the script against its parsed entries.
    pub fn sync_all(&mut self, script: ScriptHandle, source: &Script, flush: bool) {
        for proxy in self
            .proxies
            .iter_mut()
            .filter(|p| p.data_source == Some(script))
        {
            proxy.sync(script, &source.entries, flush);
        }
    }

    /// Remove a proxy from the list; its file is queued for deletion at
    /// the next save.
    pub fn remove(&mut self, pos: usize) {
        let proxy = self.proxies.remove(pos);
        self.trash.push(proxy.file_name);
    }

    /// Delete the indirection files of all proxies that are real
    /// proxies (their file is distinct from the wrapped script's file).
    pub fn delete_proxy_script_files(&self, repository: &Repository) {
        for proxy in &self.proxies {
            let is_indirection = proxy
                .data_source
                .map(|h| repository.script(h).file_name != proxy.file_name)
                .unwrap_or(false);
            if is_indirection && proxy.file_name.exists() {
                if let Err(e) = fs::remove_file(&proxy.file_name) {
                    log::warn!("could not delete proxy file {:?}: {}", proxy.file_name, e);
                }
            }
        }
    }

    /// Delete the files of proxies removed since the last save.
    pub fn clear_trash(&mut self) {
        for path in self.trash.drain(..) {
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    log::warn!("could not delete trashed proxy file {:?}: {}", path, e);
                }
            }
        }
    }

    /// Densely reassign indices starting at 10, preserving the current
    /// relative order.
    pub fn renumerate(&mut self) {
        let mut index = 10u8;
        for proxy in &mut self.proxies {
            proxy.index = index;
            index += 1;
        }
        self.sort();
    }

    /// Exchange the on-disk ordering of two proxies.
    pub fn swap(&mut self, a: usize, b: usize) {
        if a < self.proxies.len() && b < self.proxies.len() {
            let index_a = self.proxies[a].index;
            self.proxies[a].index = self.proxies[b].index;
            self.proxies[b].index = index_a;
            self.sort();
        }
    }

    pub fn clear(&mut self) {
        self.proxies.clear();
        self.trash.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(index: u8) -> Proxy {
        Proxy::new(PathBuf::from(format!("/tmp/{}_p", index)), index, 0o755)
    }

    #[test]
    fn test_renumerate_dense_from_10() {
        let mut list = ProxyList::new();
        for index in [42, 17, 93] {
            list.push(proxy(index));
        }
        list.sort();
        list.renumerate();
        let indices: Vec<u8> = list.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![10, 11, 12]);
        // relative order preserved: 17 < 42 < 93 before, same files after
        let files: Vec<String> = list
            .iter()
            .map(|p| p.file_name.to_string_lossy().to_string())
            .collect();
        assert_eq!(files, vec!["/tmp/17_p", "/tmp/42_p", "/tmp/93_p"]);
    }

    #[test]
    fn test_swap_exchanges_positions() {
        let mut list = ProxyList::new();
        list.push(proxy(10));
        list.push(proxy(11));
        list.swap(0, 1);
        assert_eq!(list.get(0).unwrap().file_name, PathBuf::from("/tmp/11_p"));
        assert_eq!(list.get(0).unwrap().index, 10);
    }

    #[test]
    fn test_proxy_required() {
        let mut list = ProxyList::new();
        let script = ScriptHandle(0);
        let other = ScriptHandle(1);
        let mut a = proxy(10);
        a.data_source = Some(script);
        let mut b = proxy(11);
        b.data_source = Some(script);
        let mut c = proxy(12);
        c.data_source = Some(other);
        list.push(a);
        list.push(b);
        list.push(c);
        assert!(list.proxy_required(script));
        assert!(!list.proxy_required(other));
        assert_eq!(list.positions_for_script(script), vec![0, 1]);
    }
}
