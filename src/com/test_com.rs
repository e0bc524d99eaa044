use std::io;
use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use super::Com;

pub struct TestCom {
    write_buf: Rc<RefCell<VecDeque<u8>>>,
    read_buf: Rc<RefCell<VecDeque<u8>>>,
}

impl Com for TestCom {
    fn get_name(&self) -> &'static str {
        "Test_Com"
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.read_buf.borrow_mut().pop_front())
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_buf.borrow_mut().extend(buf.iter());
        Ok(buf.len())
    }

    fn discard_buffer(&mut self) -> io::Result<()> {
        self.read_buf.borrow_mut().clear();
        Ok(())
    }
}

impl TestCom {
    pub fn read_all(&mut self) -> Vec<u8> {
        self.read_buf.borrow_mut().drain(..).collect()
    }
}

pub struct TestChannel {
    pub sender: TestCom,
    pub receiver: TestCom,
}

impl TestChannel {
    pub fn new() -> Self {
        let b1 = Rc::new(RefCell::new(VecDeque::new()));
        let b2 = Rc::new(RefCell::new(VecDeque::new()));
        Self {
            sender: TestCom {
                read_buf: b1.clone(),
                write_buf: b2.clone(),
            },
            receiver: TestCom {
                read_buf: b2,
                write_buf: b1,
            },
        }
    }
}

mod tests {
    #[test]
    fn test_simple() {
        use super::Com;
        let mut test = super::TestChannel::new();
        let t = b"Hello World";
        test.sender.write(t).expect("error.");
        assert_eq!(t.to_vec(), test.receiver.read_all());
    }
}
