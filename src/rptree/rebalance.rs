use crate::{
    consts::IN_MAX_KEYS,
    error::{DbError, ErrorKind},
    rptree::{
        cursor::{CursorState, RebalanceState, RptCursor},
        InPair, NodeUpdates,
    },
    storage::{page::PageKind, InnerNode, RptRoot},
    types::{BSize, DbResult, Pgno, PGNO_NULL},
};

impl RptCursor {
    /// One step of the upward walk: pop a parent, splice the child
    /// replacement sequence into its fanout, rebuild the cumulative
    /// keys from the children's actual sizes, split when the fanout
    /// overflows, and emit this level's own `(page, size)` run for
    /// the level above. With the stack empty, the run is installed
    /// into the RPT_ROOT page and the cursor unseeks.
    pub fn rebalance_execute(&mut self) -> DbResult {
        let st = match std::mem::replace(&mut self.state, CursorState::Permissive) {
            CursorState::InRebalancing(st) => st,
            s => {
                self.state = s;
                return Err(DbError::new(
                    ErrorKind::InvalidArgument,
                    &format!("rebalance_execute from state {}", self.state.name()),
                ));
            }
        };

        let result = if self.stack.is_empty() {
            self.install_root(st.updates)
        } else {
            self.rebalance_level(st.updates)
        };

        if let Err(e) = result {
            self.fail_release();
            return Err(e);
        }
        Ok(())
    }

    fn rebalance_level(&mut self, updates: NodeUpdates) -> DbResult {
        let tx = self.require_tx()?;
        let frame = self.stack.pop().expect("rebalance level needs a parent");
        let mut parent = frame.handle;
        let old_total = frame.total;
        self.pager.make_writable(&tx, &mut parent)?;

        let lo = (frame.idx as i64 + updates.lo_rel) as usize;
        let hi = (frame.idx as i64 + updates.hi_rel) as usize;

        // Splice: children outside [lo..=hi] keep their pages and
        // sizes; the replaced range contributes the update run.
        let (children, sizes) = {
            let page = parent.read();
            let old_children = page.in_children();
            assert!(lo <= hi && hi < old_children.len());

            let mut children: Vec<Pgno> = Vec::with_capacity(old_children.len());
            let mut sizes: Vec<BSize> = Vec::with_capacity(old_children.len());
            for (i, pg) in old_children.iter().enumerate() {
                if i == lo {
                    for pair in &updates.repl {
                        children.push(pair.pg);
                        sizes.push(pair.size);
                    }
                }
                if i < lo || i > hi {
                    children.push(*pg);
                    sizes.push(page.in_child_size(i as u32, old_total));
                }
            }
            (children, sizes)
        };

        if children.is_empty() {
            // Every child vanished; the node follows them.
            self.pager.delete_and_release(&tx, parent)?;
            self.state = CursorState::InRebalancing(RebalanceState {
                updates: NodeUpdates::replacing_self(Vec::new()),
            });
            return Ok(());
        }

        if children.len() <= IN_MAX_KEYS + 1 {
            let total: BSize = sizes.iter().sum();
            parent.write().in_set_fanout(&children, &sizes);
            let pair = InPair {
                pg: parent.pgno(),
                size: total,
            };
            self.pager.save(&mut parent)?;
            self.pager.release(parent);
            self.state = CursorState::InRebalancing(RebalanceState {
                updates: NodeUpdates::replacing_self(vec![pair]),
            });
            return Ok(());
        }

        // Overflow: split into two or three nodes of near-equal
        // fanout. The chunk cap keeps three always sufficient.
        let pieces = (children.len() + IN_MAX_KEYS) / (IN_MAX_KEYS + 1);
        assert!(pieces <= 3, "inner split wider than three nodes");
        let per = (children.len() + pieces - 1) / pieces;

        let old_next = parent.read().in_get_next();
        let mut out: Vec<InPair> = Vec::with_capacity(pieces);
        let mut handles = Vec::with_capacity(pieces);

        // The popped parent keeps the first piece; fresh nodes take
        // the rest.
        handles.push(parent);
        for _ in 1..pieces {
            handles.push(self.pager.new_page(&tx, PageKind::InnerNode)?);
        }

        for (i, h) in handles.iter_mut().enumerate() {
            let start = i * per;
            let end = ((i + 1) * per).min(children.len());
            let total: BSize = sizes[start..end].iter().sum();
            {
                let mut page = h.write();
                page.in_set_fanout(&children[start..end], &sizes[start..end]);
            }
            out.push(InPair {
                pg: h.pgno(),
                size: total,
            });
        }

        // Rethread the level's sibling chain through the new nodes.
        for i in 0..handles.len() {
            let next_pg = if i + 1 < handles.len() {
                handles[i + 1].pgno()
            } else {
                old_next
            };
            let prev_pg = if i > 0 {
                handles[i - 1].pgno()
            } else {
                handles[0].read().in_get_prev()
            };
            let mut page = handles[i].write();
            page.in_set_next(next_pg);
            if i > 0 {
                page.in_set_prev(prev_pg);
            }
        }
        if old_next != PGNO_NULL {
            let mut h = self
                .pager
                .get_writable(&tx, PageKind::InnerNode.bit(), old_next)?;
            h.write().in_set_prev(handles[handles.len() - 1].pgno());
            self.pager.save(&mut h)?;
            self.pager.release(h);
        }

        for mut h in handles {
            self.pager.save(&mut h)?;
            self.pager.release(h);
        }

        self.state = CursorState::InRebalancing(RebalanceState {
            updates: NodeUpdates::replacing_self(out),
        });
        Ok(())
    }

    /// The walk reached the top: rewrite the RPT_ROOT page. A run of
    /// several pages gets fresh inner levels built over it until one
    /// node covers everything; an empty run resets the tree to
    /// empty.
    fn install_root(&mut self, updates: NodeUpdates) -> DbResult {
        let mut pairs = updates.repl;

        // A run wider than one node's fanout (a bulk load into a
        // young tree) needs whole levels, not just one parent.
        while pairs.len() > 1 {
            let tx = self.require_tx()?;
            let mut level: Vec<InPair> = Vec::new();
            let mut handles = Vec::new();

            for chunk in pairs.chunks(IN_MAX_KEYS + 1) {
                let mut h = self.pager.new_page(&tx, PageKind::InnerNode)?;
                {
                    let children: Vec<Pgno> = chunk.iter().map(|p| p.pg).collect();
                    let sizes: Vec<BSize> = chunk.iter().map(|p| p.size).collect();
                    h.write().in_set_fanout(&children, &sizes);
                }
                level.push(InPair {
                    pg: h.pgno(),
                    size: chunk.iter().map(|p| p.size).sum(),
                });
                handles.push(h);
            }

            // Thread the fresh level's sibling chain.
            for i in 0..handles.len() {
                let next_pg = if i + 1 < handles.len() {
                    handles[i + 1].pgno()
                } else {
                    PGNO_NULL
                };
                let prev_pg = if i > 0 { handles[i - 1].pgno() } else { PGNO_NULL };
                let mut page = handles[i].write();
                page.in_set_next(next_pg);
                page.in_set_prev(prev_pg);
            }
            for mut h in handles {
                self.pager.save(&mut h)?;
                self.pager.release(h);
            }
            pairs = level;
        }

        let (root, nbytes) = match pairs.first() {
            None => (PGNO_NULL, 0),
            Some(p) => (p.pg, p.size),
        };
        let tx = self.require_tx()?;

        let mut rr = self
            .pager
            .get_writable(&tx, PageKind::RptRoot.bit(), self.meta_root)?;
        {
            let mut page = rr.write();
            page.rr_set_root(root);
            page.rr_set_nbytes(nbytes);
        }
        self.pager.save(&mut rr)?;
        self.pager.release(rr);

        self.root = root;
        self.total_size = nbytes;
        self.state = CursorState::Permissive;
        self.pop_all();
        Ok(())
    }
}
