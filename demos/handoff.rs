//! Two tasks meet on a rendezvous channel while a wait group keeps the main
//! task around until both have finished.

use local_rendezvous::{rendezvous, WaitGroup};

#[monoio::main]
async fn main() {
    let wg = WaitGroup::new();
    let (tx, rx) = rendezvous::channel();

    wg.add(2);
    {
        let wg = wg.clone();
        monoio::spawn(async move {
            let i = rx.recv().await.expect("sender went away");
            println!("{}", i);
            wg.done().expect("done without add");
        });
    }
    {
        let wg = wg.clone();
        monoio::spawn(async move {
            tx.send(42).await.expect("receiver went away");
            wg.done().expect("done without add");
        });
    }
    wg.wait().await;

    // The task reads `msg` after the main task reassigned it: it only runs
    // once `wait` yields.
    let msg = std::rc::Rc::new(std::cell::RefCell::new("1"));
    wg.add(1);
    {
        let wg = wg.clone();
        let msg = msg.clone();
        monoio::spawn(async move {
            println!("{}", msg.borrow());
            wg.done().expect("done without add");
        });
    }
    *msg.borrow_mut() = "2";
    wg.wait().await;
}
